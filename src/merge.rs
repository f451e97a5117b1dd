use std::{collections::HashMap, hash::Hash};

/// Returns every entry of `base` with the entries of `overrides` applied on top.
pub fn merge<K, V>(base: &HashMap<K, V>, overrides: &HashMap<K, V>) -> HashMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    let mut merged = HashMap::with_capacity(base.len() + overrides.len());
    merged.extend(base.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn overrides_win_on_shared_keys() {
        let base = map(&[("POSTGRES_DB", "postgres"), ("POSTGRES_PASSWORD", "password")]);
        let overrides = map(&[("POSTGRES_PASSWORD", "secret"), ("TZ", "UTC")]);

        let merged = merge(&base, &overrides);

        assert_eq!(
            merged,
            map(&[
                ("POSTGRES_DB", "postgres"),
                ("POSTGRES_PASSWORD", "secret"),
                ("TZ", "UTC"),
            ])
        );
    }

    #[test]
    fn leaves_inputs_untouched() {
        let base = map(&[("a", "1")]);
        let overrides = map(&[("a", "2")]);

        let _ = merge(&base, &overrides);

        assert_eq!(base, map(&[("a", "1")]));
        assert_eq!(overrides, map(&[("a", "2")]));
    }

    #[test]
    fn empty_sides() {
        let some = map(&[("a", "1")]);
        assert_eq!(merge(&HashMap::new(), &some), some);
        assert_eq!(merge(&some, &HashMap::new()), some);
        assert!(merge::<String, String>(&HashMap::new(), &HashMap::new()).is_empty());
    }
}
