//! Config command

use anyhow::Result;
use ghost_lifecycle::setup::builtin_steps;
use ghost_lifecycle::SetupContext;
use ghost_tasks::TaskRunner;
use serde_json::Value;

use super::Session;
use crate::cli::{ConfigArgs, SetupFlags};

/// Id of the setup step that writes the application config
const CONFIG_STEP: &str = "config";

pub async fn run(session: &Session, args: ConfigArgs) -> Result<()> {
    let ui = session.ui();
    let mut instance = session.instance(None)?;
    instance.check_environment();

    match (args.key, args.value) {
        (Some(key), None) => {
            if let Some(value) = instance.config().get(&key)? {
                println!("{}", display_value(&value));
            }
        }
        (Some(key), Some(raw)) => {
            let config = instance.config_mut();
            config.set(&key, parse_value(&raw))?;
            config.save()?;
            ui.success(&format!("Set '{}' to {}", key, raw));
        }
        (None, _) => {
            let flags = SetupFlags {
                config: args.flags,
                ..SetupFlags::default()
            };
            let mut runner = TaskRunner::new();
            for step in builtin_steps()? {
                if step.id() == CONFIG_STEP {
                    runner.push(step)?;
                }
            }
            let mut ctx = SetupContext::new(session.system.clone(), instance, flags.to_setup_args());
            runner.run(&mut ctx, ui.renderer()).await?;
        }
    }
    Ok(())
}

/// Booleans, numbers and `null` keep their type; everything else is a string
fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}
