use std::collections::BTreeMap;

use super::Engine;

pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_lowercase().as_str() {
        "cosmos" | "cosmosdb" => Some(Engine::Cosmos),
        #[cfg(any(test, feature = "store-memory"))]
        "memory" | "mem" => Some(Engine::Memory),
        _ => None,
    }
}

/// Parses repeated `key=value` flags; entries without `=` are ignored.
pub fn parse_connect_kv(pairs: &[String]) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for p in pairs {
        if let Some((k, v)) = p.split_once('=') {
            params.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engines_parse_case_insensitively() {
        assert_eq!(parse_engine("Cosmos"), Some(Engine::Cosmos));
        assert_eq!(parse_engine("memory"), Some(Engine::Memory));
        assert_eq!(parse_engine("redis"), None);
    }

    #[test]
    fn kv_pairs_skip_malformed_entries() {
        let params = parse_connect_kv(&[
            "max_partitions=4".to_string(),
            "bogus".to_string(),
            " latency_ms = 5 ".to_string(),
        ]);
        assert_eq!(params.len(), 2);
        assert_eq!(params["max_partitions"], "4");
        assert_eq!(params["latency_ms"], "5");
    }
}
