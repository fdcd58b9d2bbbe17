use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where [`OrderedMap::inserted`] places a new entry.
///
/// Exactly one anchor is named per call; the enum makes combining them
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
	/// Insert at this index, clamped to the end of the list.
	Index(usize),
	/// Insert immediately before the entry with this key.
	Before(String),
	/// Insert immediately after the entry with this key.
	After(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsertError {
	#[error("key `{0}` is already present")]
	KeyExists(String),
	#[error("anchor key `{0}` is not present")]
	UnknownAnchor(String),
}

/// A keyed collection that remembers insertion order.
///
/// Serializes as a plain mapping with keys in list order, so YAML and JSON
/// documents keep the order they were written in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedMap<V> {
	entries: IndexMap<String, V>,
}

impl<V> Default for OrderedMap<V> {
	fn default() -> Self {
		Self {
			entries: IndexMap::new(),
		}
	}
}

/// Equal when both hold the same entries in the same order.
impl<V: PartialEq> PartialEq for OrderedMap<V> {
	fn eq(&self, other: &Self) -> bool {
		self.entries.len() == other.entries.len() && self.entries.iter().eq(other.entries.iter())
	}
}

impl<V> OrderedMap<V> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn position(&self, key: &str) -> Option<usize> {
		self.entries.get_index_of(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	pub fn get(&self, key: &str) -> Option<&V> {
		self.entries.get(key)
	}

	pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
		self.entries.get_mut(key)
	}

	/// Appends a new key, or replaces the value of an existing key in place.
	/// Returns the replaced value.
	pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
		self.entries.insert(key.into(), value)
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}

	pub fn values(&self) -> impl Iterator<Item = &V> {
		self.entries.values()
	}

	pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
		self.entries.values_mut()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v))
	}
}

impl<V: Clone> OrderedMap<V> {
	/// Returns a copy of this map with `key` inserted at `at`. `self` is left
	/// untouched.
	pub fn inserted(
		&self,
		key: impl Into<String>,
		value: V,
		at: Position,
	) -> Result<Self, InsertError> {
		let key = key.into();
		if self.contains_key(&key) {
			return Err(InsertError::KeyExists(key));
		}
		let idx = match at {
			Position::Index(i) => i.min(self.entries.len()),
			Position::Before(anchor) => self
				.position(&anchor)
				.ok_or(InsertError::UnknownAnchor(anchor))?,
			Position::After(anchor) => {
				self.position(&anchor)
					.ok_or(InsertError::UnknownAnchor(anchor))?
					+ 1
			}
		};
		let mut entries = self.entries.clone();
		entries.shift_insert(idx, key, value);
		Ok(Self { entries })
	}
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
	fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
		Self {
			entries: iter.into_iter().collect(),
		}
	}
}

impl<V> IntoIterator for OrderedMap<V> {
	type Item = (String, V);
	type IntoIter = indexmap::map::IntoIter<String, V>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.into_iter()
	}
}
