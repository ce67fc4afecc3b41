use serde_json::json;

use crate::types::AppointmentTool;

/// A function the model may call. Declared only: calls are relayed, never run.
pub trait ToolDeclaration: Send + Sync {
    /// Tool name used in function calls.
    fn name(&self) -> &str;

    /// Description of what the tool collects.
    fn description(&self) -> &str;

    /// JSON Schema for tool parameters.
    fn parameters(&self) -> serde_json::Value;

    /// OpenAI function schema.
    fn to_schema(&self) -> serde_json::Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }
}

/// Collects the start date-time and an optional note for a new appointment.
pub struct CreateAppointment;

impl ToolDeclaration for CreateAppointment {
    fn name(&self) -> &str {
        AppointmentTool::CREATE
    }

    fn description(&self) -> &str {
        "Collects appointment date & time and message from the user"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "start": {
                    "type": "string",
                    "format": "date-time",
                    "description": "ISO 8601 date-time of the appointment"
                },
                "patientMessage": {
                    "type": "string",
                    "description": "Additional message from the user"
                }
            },
            "required": ["start"]
        })
    }
}

/// Collects the start date-time of the appointment to cancel.
pub struct DeleteAppointment;

impl ToolDeclaration for DeleteAppointment {
    fn name(&self) -> &str {
        AppointmentTool::DELETE
    }

    fn description(&self) -> &str {
        "Collects appointment date & time provided by the user"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "start": {
                    "type": "string",
                    "format": "date-time",
                    "description": "ISO 8601 date-time of the appointment to be deleted"
                }
            },
            "required": ["start"]
        })
    }
}

/// Schemas for every tool offered to the model, in declaration order.
pub fn appointment_tools() -> Vec<serde_json::Value> {
    let tools: [&dyn ToolDeclaration; 2] = [&CreateAppointment, &DeleteAppointment];
    tools.iter().map(|t| t.to_schema()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_tools_in_order() {
        let tools = appointment_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["function"]["name"], "create_appointment");
        assert_eq!(tools[1]["function"]["name"], "delete_appointment");
        assert!(tools.iter().all(|t| t["type"] == "function"));
    }

    #[test]
    fn test_start_is_required_date_time() {
        for tool in appointment_tools() {
            let params = &tool["function"]["parameters"];
            assert_eq!(params["properties"]["start"]["format"], "date-time");
            assert_eq!(params["required"], json!(["start"]));
        }
    }

    #[test]
    fn test_only_create_takes_a_note() {
        let tools = appointment_tools();
        assert!(tools[0]["function"]["parameters"]["properties"]
            .get("patientMessage")
            .is_some());
        assert!(tools[1]["function"]["parameters"]["properties"]
            .get("patientMessage")
            .is_none());
    }
}
