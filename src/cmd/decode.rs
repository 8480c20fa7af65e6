//! `portico decode`: print the dynamic configuration a label file yields.

use serde_json::{Map, Value};

use crate::cli::DecodeArgs;
use crate::error::GatewayError;
use crate::labels;

pub fn execute(args: &DecodeArgs) -> Result<(), GatewayError> {
    let content = std::fs::read_to_string(&args.labels).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GatewayError::ConfigFileNotFound {
                path: args.labels.clone(),
            }
        } else {
            GatewayError::Io(e)
        }
    })?;

    let map: Map<String, Value> =
        serde_json::from_str(&content).map_err(|e| GatewayError::ConfigParse {
            path: args.labels.display().to_string(),
            source: Box::new(e),
        })?;

    println!("{}", labels::decode_to_json(&map, &args.root, &args.filters)?);
    Ok(())
}
