use crate::config::StationsConfig;
use crate::protocol::Station;

/// Ordered station list.  Index 0 is the non-playable "dummy" sentinel, the
/// playable stations live at 1..len.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: Vec<Station>,
}

impl StationRegistry {
    pub fn new(playable: Vec<Station>) -> Self {
        let mut stations = Vec::with_capacity(playable.len() + 1);
        stations.push(Station::default());
        stations.extend(playable);
        Self { stations }
    }

    /// Resolve the selected short names against the available table.
    pub fn from_config(config: &StationsConfig) -> anyhow::Result<Self> {
        let playable = config
            .selected
            .iter()
            .map(|short| {
                config.available.get(short).cloned().ok_or_else(|| {
                    anyhow::anyhow!(
                        "selected station '{}' is not defined in [stations.available]",
                        short
                    )
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::new(playable))
    }

    /// Number of entries, sentinel included.
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn station_at(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    /// Playable station at `index`; `None` for the sentinel or out of range.
    pub fn playable_at(&self, index: usize) -> Option<&Station> {
        if index == 0 {
            return None;
        }
        self.stations.get(index)
    }

    /// Index whose entry matches both `name` and `url`.  The sentinel never
    /// matches.
    pub fn position(&self, name: &str, url: &str) -> Option<usize> {
        self.playable()
            .find(|(_, s)| s.name == name && s.url == url)
            .map(|(i, _)| i)
    }

    pub fn playable(&self) -> impl Iterator<Item = (usize, &Station)> {
        self.stations.iter().enumerate().skip(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn station(name: &str, url: &str) -> Station {
        Station {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_sentinel_is_never_playable() {
        let registry = StationRegistry::new(vec![station("A", "u1")]);
        assert_eq!(registry.station_count(), 2);
        assert!(registry.station_at(0).is_some());
        assert!(registry.playable_at(0).is_none());
        assert_eq!(registry.playable_at(1).unwrap().name, "A");
        assert!(registry.playable_at(2).is_none());
        assert_eq!(registry.position("", ""), None);
    }

    #[test]
    fn test_position_requires_both_fields() {
        let registry =
            StationRegistry::new(vec![station("A", "u1"), station("B", "u2"), station("A", "u3")]);
        assert_eq!(registry.position("A", "u1"), Some(1));
        assert_eq!(registry.position("A", "u3"), Some(3));
        assert_eq!(registry.position("A", "u2"), None);
    }

    #[test]
    fn test_from_config_keeps_selection_order() {
        let mut available = BTreeMap::new();
        available.insert("a".to_string(), station("Alpha", "ua"));
        available.insert("b".to_string(), station("Beta", "ub"));
        let config = StationsConfig {
            selected: vec!["b".to_string(), "a".to_string()],
            available,
        };
        let registry = StationRegistry::from_config(&config).unwrap();
        let names: Vec<_> = registry.playable().map(|(_, s)| s.name.as_str()).collect();
        assert_eq!(names, ["Beta", "Alpha"]);
    }

    #[test]
    fn test_from_config_rejects_unknown_selection() {
        let config = StationsConfig {
            selected: vec!["missing".to_string()],
            available: BTreeMap::new(),
        };
        let err = StationRegistry::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
