use std::collections::HashMap;

/// StatusTable is a lookup over one `key:value` status report. Comment lines (`#`) and lines that
/// don't split into exactly one key and one value are dropped.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusTable {
    entries: HashMap<String, String>,
}

impl StatusTable {
    pub fn parse(report: &str) -> Self {
        let mut entries = HashMap::new();

        for line in report.lines() {
            if line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(':');
            if let (Some(key), Some(value), None) = (fields.next(), fields.next(), fields.next()) {
                entries.insert(key.to_string(), value.to_string());
            }
        }

        StatusTable { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
