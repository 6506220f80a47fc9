//! Random integer in an inclusive range

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct RandomNumberTool;

fn default_min() -> i64 {
    1
}

fn default_max() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default = "default_min")]
    min: i64,
    #[serde(default = "default_max")]
    max: i64,
}

#[async_trait]
impl Tool for RandomNumberTool {
    fn name(&self) -> &str {
        "random_number"
    }

    fn description(&self) -> &str {
        "Generate a random integer between min and max (inclusive)."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .integer("min", "Minimum value (inclusive, default: 1)", false)
            .integer("max", "Maximum value (inclusive, default: 100)", false)
            .build()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let Input { min, max } = parse_input(input)?;
        if min > max {
            return Ok(ToolResult::error(format!(
                "Error: min ({}) cannot be greater than max ({})",
                min, max
            )));
        }

        let number = rand::thread_rng().gen_range(min..=max);
        Ok(ToolResult::success(format!(
            "Random number between {} and {}: {}",
            min, max, number
        )))
    }
}
