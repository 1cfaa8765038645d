//! Interning of taxon names into the dense [`Label`] namespace.
//!
//! The namespace is built once per tree pair from the sorted leaf names of
//! the first tree, so label order (and with it every tie-break in the search)
//! is reproducible for the same inputs.

use std::collections::HashMap;

use itertools::Itertools;

use crate::errors::DistanceError;
use crate::forest::Label;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelMap {
    names: Vec<String>,
    index: HashMap<String, Label>,
}

impl LabelMap {
    /// # Errors
    /// [`DistanceError::DuplicateTaxon`] if a name occurs twice.
    pub fn from_names<I, S>(names: I) -> Result<Self, DistanceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = sorted_unique(names.into_iter().map(Into::into).collect())?;
        let index = names.iter().cloned().enumerate().map(|(i, n)| (n, i)).collect();
        Ok(Self { names, index })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Label> {
        self.index.get(name).copied()
    }

    pub fn name(&self, label: Label) -> Option<&str> {
        self.names.get(label).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Checks that `names` is exactly this map's taxon set.
    ///
    /// # Errors
    /// [`DistanceError::DuplicateTaxon`] or [`DistanceError::TaxaMismatch`].
    pub fn check_same_taxa(&self, names: Vec<String>) -> Result<(), DistanceError> {
        let other = sorted_unique(names)?;
        if other == self.names {
            return Ok(());
        }
        let only_first = self
            .names
            .iter()
            .filter(|n| other.binary_search(*n).is_err())
            .cloned()
            .collect();
        let only_second = other
            .into_iter()
            .filter(|n| !self.index.contains_key(n))
            .collect();
        Err(DistanceError::TaxaMismatch { only_first, only_second })
    }
}

fn sorted_unique(mut names: Vec<String>) -> Result<Vec<String>, DistanceError> {
    names.sort();
    if let Some((dup, _)) = names.iter().tuple_windows().find(|(a, b)| a == b) {
        return Err(DistanceError::DuplicateTaxon(dup.clone()));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_interning() {
        let map = LabelMap::from_names(["D", "B", "A", "C"]).unwrap();
        assert_eq!(map.get("A"), Some(0));
        assert_eq!(map.get("D"), Some(3));
        assert_eq!(map.name(2), Some("C"));
        assert_eq!(map.name(4), None);
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_duplicate_name() {
        let err = LabelMap::from_names(["A", "B", "A"]).unwrap_err();
        assert!(matches!(err, DistanceError::DuplicateTaxon(name) if name == "A"));
    }

    #[test]
    fn test_taxa_mismatch() {
        let map = LabelMap::from_names(["A", "B", "C", "E"]).unwrap();
        assert!(map.check_same_taxa(vec!["E".into(), "C".into(), "B".into(), "A".into()]).is_ok());
        match map.check_same_taxa(vec!["A".into(), "B".into(), "C".into(), "D".into()]) {
            Err(DistanceError::TaxaMismatch { only_first, only_second }) => {
                assert_eq!(only_first, vec!["E".to_string()]);
                assert_eq!(only_second, vec!["D".to_string()]);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }
}
