//! External loot database: template metadata keyed by template id, loaded
//! once at startup from a JSON file shipped alongside the observer.

use std::collections::HashMap;
use std::io::Read;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LootDatabaseError {
    #[error("failed to read loot database file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse loot database json")]
    Json(#[from] serde_path_to_error::Error<serde_json::Error>),
}

/// Broad item category, used to group templates for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Category {
    Weapon,
    Armor,
    Medical,
    Ammo,
    Container,
    Key,
    Valuable,
    Other,
}

/// Static metadata for one loot template id.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub credit_price: i64,
    pub grid_width: i32,
    pub grid_height: i32,
}

/// In-memory index over all known loot templates, queried by id during
/// value computation and reporting.
#[derive(Debug, Default)]
pub struct LootDatabase {
    templates: HashMap<String, Template>,
}

impl LootDatabase {
    pub fn empty() -> Self {
        Self { templates: HashMap::new() }
    }

    pub fn load<R: Read>(reader: R) -> Result<Self, LootDatabaseError> {
        let de = &mut serde_json::Deserializer::from_reader(reader);
        let templates: Vec<Template> = serde_path_to_error::deserialize(de)?;
        Ok(Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        })
    }

    pub fn query_template(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn category_of(&self, id: &str) -> Option<Category> {
        self.query_template(id).map(|t| t.category)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_templates_keyed_by_id() {
        let json = r#"[
            {"id": "ammo_9mm", "name": "9mm round", "category": "Ammo", "credit_price": 10, "grid_width": 1, "grid_height": 1},
            {"id": "vest_light", "name": "Light vest", "category": "Armor", "credit_price": 5000, "grid_width": 2, "grid_height": 3}
        ]"#;
        let db = LootDatabase::load(json.as_bytes()).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.query_template("ammo_9mm").unwrap().credit_price, 10);
        assert_eq!(db.category_of("vest_light"), Some(Category::Armor));
    }

    #[test]
    fn missing_template_is_none() {
        let db = LootDatabase::empty();
        assert!(db.query_template("nope").is_none());
    }
}
