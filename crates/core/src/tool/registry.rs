use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::pin::Pin;

use coach_relay_model::ModelTool;
use serde_json::Value;

use super::object::{ToolObject, ToolObjectImpl};
use super::{Tool, ToolResult};

/// A tool stored in a [`Registry`], with its input type erased.
pub struct RegisteredTool(Box<dyn ToolObject>);

impl RegisteredTool {
    /// Returns the name of the tool.
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Returns the definition advertised to the model.
    #[inline]
    pub fn definition(&self) -> ModelTool {
        ModelTool {
            name: self.0.name().to_owned(),
            description: self.0.description().to_owned(),
            parameters: self.0.parameter_schema().clone(),
        }
    }

    /// Executes the tool with JSON arguments. Arguments that don't match
    /// the tool's input type fail with an `InvalidInput` error.
    #[inline]
    pub fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        self.0.execute(arguments)
    }
}

impl Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegisteredTool").field(&self.name()).finish()
    }
}

/// The result of looking up a tool by name.
#[derive(Debug)]
pub enum Lookup<'a> {
    /// A tool with the name is registered.
    Found(&'a RegisteredTool),
    /// No tool has the name.
    NotFound,
}

/// The set of tools the model may call.
///
/// Built once at startup and only read afterwards, so it can be shared
/// across requests behind an `Arc`.
#[derive(Default)]
pub struct Registry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl Registry {
    /// Registers a tool, replacing any tool with the same name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        if self.tools.contains_key(&name) {
            warn!("replacing registered tool: {name}");
        }
        self.tools
            .insert(name, RegisteredTool(Box::new(ToolObjectImpl(tool))));
    }

    /// Registers a tool, builder style.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add_tool(tool);
        self
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns definitions of all tools, ordered by name.
    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools.values().map(RegisteredTool::definition).collect()
    }

    /// Looks up a tool by name.
    #[inline]
    pub fn lookup(&self, name: &str) -> Lookup<'_> {
        match self.tools.get(name) {
            Some(tool) => Lookup::Found(tool),
            None => Lookup::NotFound,
        }
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use schemars::{JsonSchema, schema_for};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::tool::{Error as ToolError, ErrorKind};

    #[derive(Deserialize, JsonSchema)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool {
        parameter_schema: Value,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                parameter_schema: schema_for!(EchoInput).to_value(),
            }
        }
    }

    impl Tool for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the text back."
        }

        fn parameter_schema(&self) -> &Value {
            &self.parameter_schema
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            let result = if input.text.is_empty() {
                Err(ToolError::execution_error().with_reason("nothing to echo"))
            } else {
                Ok(json!({ "echo": input.text }))
            };
            ready(result)
        }
    }

    #[tokio::test]
    async fn test_lookup_and_execute() {
        let registry = Registry::default().with_tool(EchoTool::new());

        let Lookup::Found(tool) = registry.lookup("echo") else {
            panic!("echo should be registered");
        };
        let result = tool.execute(json!({ "text": "hi" })).await.unwrap();
        assert_eq!(result, json!({ "echo": "hi" }));

        let err = tool.execute(json!({ "text": "" })).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert_eq!(err.reason(), "nothing to echo");

        let err = tool.execute(json!({ "txt": "hi" })).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert!(matches!(registry.lookup("read_file"), Lookup::NotFound));
    }

    #[test]
    fn test_definitions() {
        let registry = Registry::default().with_tool(EchoTool::new());
        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "echo");
        assert_eq!(definitions[0].parameters["type"], "object");
        assert!(definitions[0].parameters["properties"]["text"].is_object());

        assert!(Registry::default().is_empty());
    }
}
