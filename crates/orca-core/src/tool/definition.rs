//! Tool schema helpers

use serde_json::{Map, Value as JsonValue, json};

pub use crate::llm::ToolDefinition;

/// Fluent builder for object input schemas
///
/// ```ignore
/// let schema = SchemaBuilder::object()
///     .string("query", "The search query", true)
///     .integer("limit", "Maximum results", false)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    properties: Map<String, JsonValue>,
    required: Vec<String>,
}

impl SchemaBuilder {
    /// Start an object schema
    pub fn object() -> Self {
        Self::default()
    }

    /// Add a property with an arbitrary schema
    pub fn property(mut self, name: &str, schema: JsonValue, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "string", "description": description}), required)
    }

    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "integer", "description": description}), required)
    }

    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "boolean", "description": description}), required)
    }

    /// Array property whose items follow `items`
    pub fn array(self, name: &str, description: &str, items: JsonValue, required: bool) -> Self {
        self.property(
            name,
            json!({"type": "array", "description": description, "items": items}),
            required,
        )
    }

    pub fn build(self) -> JsonValue {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }

    /// A string enum schema
    pub fn string_enum(values: &[&str]) -> JsonValue {
        json!({"type": "string", "enum": values})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_schema() {
        let schema = SchemaBuilder::object()
            .string("task", "What to do", true)
            .integer("max_iterations", "Round budget", false)
            .boolean("verbose", "Chatty output", false)
            .build();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["task"]["type"], "string");
        assert_eq!(schema["properties"]["max_iterations"]["type"], "integer");
        assert_eq!(schema["required"], json!(["task"]));
    }

    #[test]
    fn test_array_and_enum() {
        let schema = SchemaBuilder::object()
            .array("modes", "Modes", SchemaBuilder::string_enum(&["a", "b"]), true)
            .build();
        assert_eq!(schema["properties"]["modes"]["items"]["enum"], json!(["a", "b"]));
    }

    #[test]
    fn test_empty_object() {
        let schema = SchemaBuilder::object().build();
        assert_eq!(schema["properties"], json!({}));
        assert_eq!(schema["required"], json!([]));
    }
}
