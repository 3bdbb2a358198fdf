use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamRating {
    pub rank: Option<u32>,
    pub points: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RatingTable {
    entries: HashMap<String, TeamRating>,
    // lowercase name -> canonical name
    folded: HashMap<String, String>,
}

impl RatingTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fifa() -> Self {
        FIFA_TABLE.clone()
    }

    /// Built-in table with the entries of a JSON file layered on top.
    pub fn with_overrides_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read ratings file {}", path.display()))?;
        let overrides = serde_json::from_str::<HashMap<String, TeamRating>>(&raw)
            .with_context(|| format!("parse ratings file {}", path.display()))?;
        let mut table = Self::fifa();
        for (name, rating) in overrides {
            table.insert(&name, rating);
        }
        Ok(table)
    }

    pub fn insert(&mut self, name: &str, rating: TeamRating) {
        let name = name.trim().to_string();
        self.folded.insert(name.to_lowercase(), name.clone());
        self.entries.insert(name, rating);
    }

    pub fn lookup(&self, name: &str) -> Option<TeamRating> {
        let name = name.trim();
        if let Some(r) = self.entries.get(name) {
            return Some(*r);
        }
        let canonical = self.folded.get(&name.to_lowercase())?;
        self.entries.get(canonical).copied()
    }

    /// Name under which `name` is stored, resolving case differences.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        if let Some((stored, _)) = self.entries.get_key_value(name) {
            return Some(stored.as_str());
        }
        self.folded.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Rating points usable by the simulators; zero or non-finite points count as missing.
    pub fn points(&self, name: &str) -> Option<f64> {
        self.lookup(name)
            .map(|r| r.points)
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static FIFA_TABLE: Lazy<RatingTable> = Lazy::new(|| {
    let mut table = RatingTable::empty();
    for (name, rank, points) in FIFA_RANKINGS {
        table.insert(
            name,
            TeamRating {
                rank: *rank,
                points: *points,
            },
        );
    }
    table
});

// FIFA men's ranking, 20 Nov 2025. Aliases share the rank of their canonical entry.
const FIFA_RANKINGS: &[(&str, Option<u32>, f64)] = &[
    ("Spain", Some(1), 1877.18),
    ("Argentina", Some(2), 1873.33),
    ("France", Some(3), 1870.0),
    ("England", Some(4), 1834.12),
    ("Brazil", Some(5), 1760.46),
    ("Portugal", Some(6), 1760.38),
    ("Netherlands", Some(7), 1756.27),
    ("Belgium", Some(8), 1730.71),
    ("Germany", Some(9), 1724.15),
    ("Croatia", Some(10), 1716.88),
    ("Morocco", Some(11), 1713.12),
    ("Italy", Some(12), 1702.06),
    ("Colombia", Some(13), 1701.3),
    ("USA", Some(14), 1681.88),
    ("United States", Some(14), 1681.88),
    ("Mexico", Some(15), 1675.75),
    ("Uruguay", Some(16), 1672.62),
    ("Switzerland", Some(17), 1654.69),
    ("Japan", Some(18), 1650.12),
    ("Senegal", Some(19), 1648.07),
    ("IR Iran", Some(20), 1617.02),
    ("Iran", Some(20), 1617.02),
    ("Denmark", Some(21), 1616.75),
    ("Korea Republic", Some(22), 1599.45),
    ("South Korea", Some(22), 1599.45),
    ("Ecuador", Some(23), 1591.73),
    ("Austria", Some(24), 1585.51),
    ("Türkiye", Some(25), 1582.69),
    ("Turkey", Some(25), 1582.69),
    ("Australia", Some(26), 1574.01),
    ("Canada", Some(27), 1559.15),
    ("Ukraine", Some(28), 1557.47),
    ("Norway", Some(29), 1553.14),
    ("Panama", Some(30), 1540.43),
    ("Poland", Some(31), 1532.04),
    ("Wales", Some(32), 1529.71),
    ("Russia", Some(33), 1524.52),
    ("Egypt", Some(34), 1520.68),
    ("Algeria", Some(35), 1516.37),
    ("Scotland", Some(36), 1506.77),
    ("Serbia", Some(37), 1506.34),
    ("Nigeria", Some(38), 1502.46),
    ("Paraguay", Some(39), 1501.5),
    ("Tunisia", Some(40), 1497.13),
    ("Hungary", Some(41), 1496.29),
    ("Côte d'Ivoire", Some(42), 1489.59),
    ("Ivory Coast", Some(42), 1489.59),
    ("Sweden", Some(43), 1487.13),
    ("Czechia", Some(44), 1487.0),
    ("Czech Republic", Some(44), 1487.0),
    ("Slovakia", Some(45), 1485.65),
    ("Greece", Some(46), 1480.38),
    ("Romania", Some(47), 1465.78),
    ("Venezuela", Some(48), 1465.22),
    ("Costa Rica", Some(49), 1464.24),
    ("Uzbekistan", Some(50), 1462.03),
    ("Qatar", Some(51), 1461.6),
    ("Peru", Some(52), 1459.57),
    ("Chile", Some(53), 1457.84),
    ("Mali", Some(54), 1455.03),
    ("Slovenia", Some(55), 1447.31),
    ("Congo DR", Some(56), 1442.5),
    ("DR Congo", Some(56), 1442.5),
    ("Cameroon", Some(57), 1440.43),
    ("Iraq", Some(58), 1438.92),
    ("Republic of Ireland", Some(59), 1436.04),
    ("Ireland", Some(59), 1436.04),
    ("Saudi Arabia", Some(60), 1428.74),
    ("South Africa", Some(61), 1426.73),
    ("Burkina Faso", Some(62), 1404.81),
    ("Albania", Some(63), 1401.07),
    ("Honduras", Some(64), 1379.54),
    ("North Macedonia", Some(65), 1378.57),
    ("Jordan", Some(66), 1377.66),
    ("United Arab Emirates", Some(67), 1369.71),
    ("Cabo Verde", Some(68), 1367.95),
    ("Cape Verde", Some(68), 1367.95),
    ("Northern Ireland", Some(69), 1366.02),
    ("Jamaica", Some(70), 1362.46),
    ("Bosnia and Herzegovina", Some(71), 1362.37),
    ("Ghana", Some(72), 1351.09),
    ("Georgia", Some(73), 1347.88),
    ("Iceland", Some(74), 1344.72),
    ("Finland", Some(75), 1341.81),
    ("Bolivia", Some(76), 1329.56),
    ("Israel", Some(77), 1328.14),
    ("Gabon", Some(78), 1321.25),
    ("Oman", Some(79), 1312.45),
    ("Kosovo", Some(80), 1308.84),
    ("Guinea", Some(81), 1307.05),
    ("Curaçao", Some(82), 1302.7),
    ("Montenegro", Some(83), 1297.09),
    ("Haiti", Some(84), 1294.49),
    ("Uganda", Some(85), 1288.01),
    ("New Zealand", Some(86), 1279.25),
    ("Syria", Some(87), 1278.1),
    ("Bulgaria", Some(88), 1272.19),
    ("Angola", Some(89), 1271.54),
    ("Zambia", Some(90), 1260.06),
    ("Bahrain", Some(91), 1258.68),
    ("Benin", Some(92), 1255.72),
    ("China PR", Some(93), 1249.06),
    ("China", Some(93), 1249.06),
    ("Guatemala", Some(94), 1245.77),
    ("Thailand", Some(95), 1243.27),
    ("Palestine", Some(96), 1230.55),
    ("Equatorial Guinea", Some(97), 1229.09),
    ("Trinidad and Tobago", Some(98), 1227.32),
    ("Belarus", Some(99), 1227.09),
    ("El Salvador", Some(100), 1226.65),
    ("Tajikistan", Some(101), 1224.93),
    ("Mozambique", Some(102), 1223.48),
    ("Luxembourg", Some(103), 1218.91),
    ("Kyrgyz Republic", Some(104), 1201.22),
    ("Madagascar", Some(105), 1198.87),
    ("Armenia", Some(106), 1196.08),
    ("Lebanon", Some(107), 1190.64),
    ("Comoros", Some(108), 1189.75),
    ("Niger", Some(109), 1185.09),
    ("Vietnam", Some(110), 1183.62),
    ("Libya", Some(111), 1182.78),
    ("Tanzania", Some(112), 1181.22),
    ("Kenya", Some(113), 1179.54),
    ("Mauritania", Some(114), 1174.19),
    ("Kazakhstan", Some(115), 1173.0),
    ("Malaysia", Some(116), 1168.41),
    ("The Gambia", Some(117), 1161.55),
    ("Sudan", Some(118), 1153.56),
    ("Namibia", Some(119), 1153.22),
    ("Korea DPR", Some(120), 1151.05),
    ("Sierra Leone", Some(121), 1149.1),
    ("Indonesia", Some(122), 1144.73),
    ("Suriname", Some(123), 1140.54),
    ("Togo", Some(124), 1140.35),
    ("Faroe Islands", Some(125), 1135.42),
    ("Malawi", Some(126), 1133.75),
    ("Azerbaijan", Some(127), 1132.97),
    ("Cyprus", Some(128), 1128.5),
    ("Zimbabwe", Some(129), 1123.69),
    ("Estonia", Some(130), 1123.11),
    ("Rwanda", Some(131), 1117.78),
    ("Nicaragua", Some(132), 1116.86),
    ("Guinea-Bissau", Some(133), 1108.09),
    ("Congo", Some(134), 1105.96),
    ("Kuwait", Some(135), 1103.25),
    ("Philippines", Some(136), 1090.95),
    ("Turkmenistan", Some(137), 1087.52),
    ("Botswana", Some(138), 1084.56),
    ("Central African Republic", Some(139), 1083.57),
    ("Latvia", Some(140), 1082.68),
    ("Liberia", Some(141), 1081.46),
    ("India", Some(142), 1079.52),
    ("Dominican Republic", Some(143), 1077.49),
    ("Lesotho", Some(144), 1065.97),
    ("Burundi", Some(145), 1060.22),
    ("Lithuania", Some(146), 1056.34),
    ("Ethiopia", Some(147), 1055.36),
    ("Yemen", Some(148), 1048.83),
    ("New Caledonia", Some(149), 1042.62),
    ("Guyana", Some(150), 1041.9),
    ("Singapore", Some(151), 1040.43),
    ("Solomon Islands", Some(152), 1039.86),
    ("Hong Kong, China", Some(153), 1038.14),
    ("St Kitts and Nevis", Some(154), 1035.25),
    ("Fiji", Some(155), 1029.7),
    ("Puerto Rico", Some(156), 1020.07),
    ("Tahiti", Some(157), 1019.04),
    ("Moldova", Some(158), 1012.64),
    ("Eswatini", Some(159), 1010.52),
    ("Vanuatu", Some(160), 997.01),
    ("Malta", Some(161), 996.59),
    ("Afghanistan", Some(162), 991.19),
    ("Myanmar", Some(163), 990.81),
    ("Grenada", Some(164), 989.59),
    ("Antigua and Barbuda", Some(165), 986.58),
    ("Cuba", Some(166), 980.49),
    ("St Lucia", Some(167), 980.28),
    ("South Sudan", Some(168), 978.7),
    ("Bermuda", Some(169), 976.87),
    ("Papua New Guinea", Some(170), 974.9),
    ("St Vincent and the Grenadines", Some(171), 963.74),
    ("Andorra", Some(172), 949.44),
    ("Maldives", Some(173), 945.02),
    ("Chinese Taipei", Some(174), 938.21),
    ("Montserrat", Some(175), 916.75),
    ("Mauritius", Some(176), 915.51),
    ("Chad", Some(177), 914.65),
    ("Barbados", Some(178), 914.42),
    ("Cambodia", Some(179), 911.54),
    ("Bangladesh", Some(180), 911.19),
    ("Belize", Some(181), 910.74),
    ("Nepal", Some(182), 902.44),
    ("Dominica", Some(183), 901.37),
    ("American Samoa", Some(184), 883.17),
    ("Mongolia", Some(185), 879.75),
    ("Cook Islands", Some(186), 877.53),
    ("Laos", Some(187), 877.05),
    ("Samoa", Some(188), 876.41),
    ("Brunei Darussalam", Some(189), 875.78),
    ("São Tomé and Príncipe", Some(190), 871.63),
    ("Aruba", Some(191), 867.94),
    ("Bhutan", Some(192), 867.86),
    ("Macau", Some(193), 865.29),
    ("Sri Lanka", Some(194), 857.4),
    ("Cayman Islands", Some(195), 851.74),
    ("Djibouti", Some(196), 847.89),
    ("Tonga", Some(197), 835.64),
    ("Timor-Leste", Some(198), 835.55),
    ("Pakistan", Some(199), 833.16),
    ("Somalia", Some(200), 827.07),
    ("Guam", Some(201), 823.08),
    ("Gibraltar", Some(202), 818.03),
    ("Seychelles", Some(203), 805.33),
    ("Turks and Caicos Islands", Some(204), 803.98),
    ("Liechtenstein", Some(205), 799.8),
    ("Bahamas", Some(206), 796.6),
    ("US Virgin Islands", Some(207), 776.6),
    ("British Virgin Islands", Some(208), 776.54),
    ("Anguilla", Some(209), 759.78),
    ("San Marino", Some(210), 726.03),
    ("Eritrea", None, 855.56),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn exact_and_case_insensitive_lookup() {
        let table = RatingTable::fifa();
        let spain = table.lookup("Spain").unwrap();
        assert_eq!(spain.rank, Some(1));
        assert!((spain.points - 1877.18).abs() < 1e-9);
        assert_eq!(table.lookup("  spain ").unwrap(), spain);
        assert_eq!(table.lookup("SOUTH KOREA").unwrap().rank, Some(22));
    }

    #[test]
    fn canonical_name_folds_case() {
        let table = RatingTable::fifa();
        assert_eq!(table.canonical_name(" SPAIN"), Some("Spain"));
        assert_eq!(table.canonical_name("Spain"), Some("Spain"));
        assert_eq!(table.canonical_name("Atlantis"), None);
    }

    #[test]
    fn aliases_resolve_to_same_points() {
        let table = RatingTable::fifa();
        assert_eq!(table.lookup("USA"), table.lookup("United States"));
        assert_eq!(table.lookup("Ivory Coast"), table.lookup("Côte d'Ivoire"));
    }

    #[test]
    fn unranked_team_keeps_points() {
        let table = RatingTable::fifa();
        let eritrea = table.lookup("Eritrea").unwrap();
        assert_eq!(eritrea.rank, None);
        assert!(table.points("Eritrea").is_some());
    }

    #[test]
    fn unknown_team_is_none() {
        let table = RatingTable::fifa();
        assert!(table.lookup("Atlantis").is_none());
        assert!(table.points("Atlantis").is_none());
    }

    #[test]
    fn zero_points_count_as_missing() {
        let mut table = RatingTable::empty();
        table.insert("Ghost", TeamRating { rank: None, points: 0.0 });
        assert!(table.lookup("Ghost").is_some());
        assert!(table.points("Ghost").is_none());
    }

    #[test]
    fn overrides_file_replaces_and_extends() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Spain": {{"rank": 2, "points": 1800.0}}, "Atlantis": {{"rank": null, "points": 1234.5}}}}"#
        )
        .unwrap();
        let table = RatingTable::with_overrides_file(file.path()).unwrap();
        assert_eq!(table.lookup("Spain").unwrap().rank, Some(2));
        assert_eq!(table.points("atlantis"), Some(1234.5));
        assert!(table.lookup("France").is_some());
    }

    #[test]
    fn overrides_file_errors_are_reported() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "not json").unwrap();
        assert!(RatingTable::with_overrides_file(file.path()).is_err());
    }
}
