//! Service Control Protocol Description parsing.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use xmltree::{Element, XMLNode};

use crate::descriptor::strip_default_namespace;
use crate::errors::GenerationError;
use crate::native::{ParameterKind, ParameterSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: String,
    pub kind: ParameterKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub arguments: Vec<ArgumentSpec>,
}

impl ActionSpec {
    pub fn inputs(&self) -> Vec<ParameterSpec> {
        self.parameters(Direction::In)
    }

    pub fn outputs(&self) -> Vec<ParameterSpec> {
        self.parameters(Direction::Out)
    }

    fn parameters(&self, direction: Direction) -> Vec<ParameterSpec> {
        self.arguments
            .iter()
            .filter(|a| a.direction == direction)
            .map(|a| ParameterSpec::new(&a.name, a.kind))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVariableSpec {
    pub name: String,
    pub data_type: String,
    pub kind: ParameterKind,
    pub send_events: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

/// Actions and state variables of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScpdDocument {
    pub actions: Vec<ActionSpec>,
    pub state_variables: Vec<StateVariableSpec>,
}

impl ScpdDocument {
    pub fn parse(xml: &str) -> Result<Self, GenerationError> {
        let xml = strip_default_namespace(xml);
        let root = Element::parse(&mut Cursor::new(xml.as_bytes()))
            .map_err(|e| GenerationError::Scpd(e.to_string()))?;
        if root.name != "scpd" {
            return Err(GenerationError::Scpd(format!(
                "root element is <{}>, expected <scpd>",
                root.name
            )));
        }

        let mut state_variables = Vec::new();
        if let Some(table) = root.get_child("serviceStateTable") {
            for var in elements(table, "stateVariable") {
                state_variables.push(parse_state_variable(var)?);
            }
        }

        let mut actions = Vec::new();
        if let Some(list) = root.get_child("actionList") {
            for action in elements(list, "action") {
                actions.push(parse_action(action, &state_variables)?);
            }
        }

        Ok(Self {
            actions,
            state_variables,
        })
    }

    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// State variables exposed as proxy properties.
    pub fn properties(&self) -> impl Iterator<Item = &StateVariableSpec> {
        self.state_variables.iter().filter(|v| v.send_events)
    }
}

fn parse_state_variable(var: &Element) -> Result<StateVariableSpec, GenerationError> {
    let name = required_text(var, "name", "stateVariable")?;
    let data_type = required_text(var, "dataType", &name)?;
    // sendEvents defaults to "yes"
    let send_events = var
        .attributes
        .get("sendEvents")
        .map(|v| !v.trim().eq_ignore_ascii_case("no"))
        .unwrap_or(true);
    let allowed_values = var
        .get_child("allowedValueList")
        .map(|list| {
            elements(list, "allowedValue")
                .filter_map(|v| v.get_text().map(|t| t.trim().to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(StateVariableSpec {
        kind: ParameterKind::from_upnp_data_type(&data_type),
        name,
        data_type,
        send_events,
        allowed_values,
    })
}

fn parse_action(
    action: &Element,
    state_variables: &[StateVariableSpec],
) -> Result<ActionSpec, GenerationError> {
    let name = required_text(action, "name", "action")?;
    let mut arguments = Vec::new();

    if let Some(list) = action.get_child("argumentList") {
        for arg in elements(list, "argument") {
            let arg_name = required_text(arg, "name", &name)?;
            let direction = match required_text(arg, "direction", &arg_name)?.as_str() {
                "in" => Direction::In,
                "out" => Direction::Out,
                other => {
                    return Err(GenerationError::Scpd(format!(
                        "argument {} of {} has direction '{}'",
                        arg_name, name, other
                    )));
                }
            };
            let related = required_text(arg, "relatedStateVariable", &arg_name)?;
            let kind = state_variables
                .iter()
                .find(|v| v.name == related)
                .map(|v| v.kind)
                .ok_or_else(|| {
                    GenerationError::Scpd(format!(
                        "argument {} of {} refers to unknown state variable {}",
                        arg_name, name, related
                    ))
                })?;
            arguments.push(ArgumentSpec {
                name: arg_name,
                direction,
                related_state_variable: related,
                kind,
            });
        }
    }

    Ok(ActionSpec { name, arguments })
}

fn elements<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(e) if e.name == name => Some(e),
        _ => None,
    })
}

fn required_text(parent: &Element, child: &str, context: &str) -> Result<String, GenerationError> {
    parent
        .get_child(child)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GenerationError::Scpd(format!("missing <{}> in {}", child, context)))
}
