use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields a section does not recognize, kept verbatim.
///
/// Every manifest section flattens one of these, so a field written by a
/// newer producer survives a load → mutate → save cycle untouched. Key order
/// is the order the fields appeared in the source document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionMap(Map<String, Value>);

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl From<Map<String, Value>> for ExtensionMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ExtensionMap> for Map<String, Value> {
    fn from(ext: ExtensionMap) -> Self {
        ext.0
    }
}

impl FromIterator<(String, Value)> for ExtensionMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
