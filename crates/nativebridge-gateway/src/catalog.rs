//! Browser-automation capabilities served by the extension.
//!
//! Every entry forwards as one native `call_tool` request carrying
//! `{name, arguments}`; the extension does the actual work.

use std::time::Duration;

use nativebridge_router::{MessageRouter, RpcRequest};
use serde_json::{json, Value};

use crate::capability::{Capability, CapabilityRegistry};
use crate::error::{CapabilityError, RegistryError};

/// Native method every catalog capability forwards to.
pub const CALL_TOOL_METHOD: &str = "call_tool";

struct CatalogEntry {
    name: &'static str,
    description: &'static str,
    timeout_secs: u64,
    schema: fn() -> Value,
}

const BASE: &[CatalogEntry] = &[
    CatalogEntry {
        name: "get_windows_and_tabs",
        description: "List open browser windows and their tabs",
        timeout_secs: 10,
        schema: empty_object,
    },
    CatalogEntry {
        name: "navigate",
        description: "Open a URL in the current tab or a new one",
        timeout_secs: 30,
        schema: navigate_schema,
    },
    CatalogEntry {
        name: "close_tabs",
        description: "Close tabs by id or by URL",
        timeout_secs: 10,
        schema: close_tabs_schema,
    },
    CatalogEntry {
        name: "go_back_or_forward",
        description: "Move through a tab's history",
        timeout_secs: 10,
        schema: history_step_schema,
    },
    CatalogEntry {
        name: "screenshot",
        description: "Capture the visible page or a single element",
        timeout_secs: 60,
        schema: screenshot_schema,
    },
    CatalogEntry {
        name: "get_web_content",
        description: "Fetch text or HTML content from the current page",
        timeout_secs: 30,
        schema: web_content_schema,
    },
    CatalogEntry {
        name: "click_element",
        description: "Click an element selected by CSS selector or coordinates",
        timeout_secs: 15,
        schema: click_schema,
    },
    CatalogEntry {
        name: "fill_or_select",
        description: "Fill an input or choose an option in a select element",
        timeout_secs: 15,
        schema: fill_schema,
    },
    CatalogEntry {
        name: "keyboard",
        description: "Send key presses to the page",
        timeout_secs: 15,
        schema: keyboard_schema,
    },
    CatalogEntry {
        name: "history",
        description: "Search browsing history",
        timeout_secs: 15,
        schema: history_schema,
    },
    CatalogEntry {
        name: "bookmark_search",
        description: "Search bookmarks by title or URL",
        timeout_secs: 15,
        schema: bookmark_search_schema,
    },
    CatalogEntry {
        name: "bookmark_add",
        description: "Add a bookmark",
        timeout_secs: 15,
        schema: bookmark_add_schema,
    },
];

const EXTENDED: &[CatalogEntry] = &[
    CatalogEntry {
        name: "network_capture_start",
        description: "Start recording network requests for a tab",
        timeout_secs: 15,
        schema: capture_start_schema,
    },
    CatalogEntry {
        name: "network_capture_stop",
        description: "Stop recording and return captured requests",
        timeout_secs: 60,
        schema: empty_object,
    },
    CatalogEntry {
        name: "inject_script",
        description: "Inject a script into a tab",
        timeout_secs: 30,
        schema: inject_script_schema,
    },
    CatalogEntry {
        name: "console",
        description: "Collect console output from a tab",
        timeout_secs: 30,
        schema: console_schema,
    },
];

/// Register the standard capability set, plus the extended set when
/// `extended` is true.
pub fn register_catalog(
    registry: &mut CapabilityRegistry,
    router: &MessageRouter,
    extended: bool,
) -> Result<(), RegistryError> {
    let entries = BASE
        .iter()
        .chain(EXTENDED.iter().filter(|_| extended));
    for entry in entries {
        registry.register(forwarding(entry, router.clone()))?;
    }
    tracing::debug!(count = registry.len(), extended, "capability catalog registered");
    Ok(())
}

/// Names of the capabilities [`register_catalog`] would add.
pub fn catalog_names(extended: bool) -> Vec<&'static str> {
    BASE.iter()
        .chain(EXTENDED.iter().filter(|_| extended))
        .map(|entry| entry.name)
        .collect()
}

// The router gets the same deadline so a timed-out call leaves no pending
// entry behind.
fn forwarding(entry: &CatalogEntry, router: MessageRouter) -> Capability {
    let name = entry.name;
    let timeout = Duration::from_secs(entry.timeout_secs);
    Capability::new(name, entry.description, (entry.schema)(), move |arguments| {
        let router = router.clone();
        async move {
            let params = json!({ "name": name, "arguments": arguments });
            let request = RpcRequest::new(CALL_TOOL_METHOD, Some(params));
            router
                .rpc_request(request, Some(timeout))
                .await
                .map_err(CapabilityError::from)
        }
    })
    .with_timeout(timeout)
}

fn empty_object() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn navigate_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": { "type": "string", "minLength": 1 },
            "newWindow": { "type": "boolean" },
            "width": { "type": "integer", "minimum": 1 },
            "height": { "type": "integer", "minimum": 1 }
        },
        "required": ["url"]
    })
}

fn close_tabs_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tabIds": { "type": "array", "items": { "type": "integer" } },
            "url": { "type": "string" }
        }
    })
}

fn history_step_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "isForward": { "type": "boolean" } }
    })
}

fn screenshot_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "selector": { "type": "string" },
            "fullPage": { "type": "boolean" },
            "storeBase64": { "type": "boolean" }
        }
    })
}

fn web_content_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "selector": { "type": "string" },
            "htmlContent": { "type": "boolean" },
            "textContent": { "type": "boolean" }
        }
    })
}

fn click_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "selector": { "type": "string" },
            "coordinates": {
                "type": "object",
                "properties": {
                    "x": { "type": "number" },
                    "y": { "type": "number" }
                },
                "required": ["x", "y"]
            },
            "waitForNavigation": { "type": "boolean" },
            "timeout": { "type": "integer", "minimum": 0 }
        }
    })
}

fn fill_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "selector": { "type": "string", "minLength": 1 },
            "value": { "type": ["string", "number", "boolean"] }
        },
        "required": ["selector", "value"]
    })
}

fn keyboard_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "keys": { "type": "string", "minLength": 1 },
            "selector": { "type": "string" },
            "delay": { "type": "integer", "minimum": 0 }
        },
        "required": ["keys"]
    })
}

fn history_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "text": { "type": "string" },
            "startTime": { "type": "string" },
            "endTime": { "type": "string" },
            "maxResults": { "type": "integer", "minimum": 1 }
        }
    })
}

fn bookmark_search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "maxResults": { "type": "integer", "minimum": 1 },
            "folderPath": { "type": "string" }
        }
    })
}

fn bookmark_add_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "title": { "type": "string" },
            "parentId": { "type": "string" },
            "createFolder": { "type": "boolean" }
        }
    })
}

fn capture_start_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "maxCaptureTime": { "type": "integer", "minimum": 0 },
            "inactivityTimeout": { "type": "integer", "minimum": 0 },
            "includeStatic": { "type": "boolean" }
        }
    })
}

fn inject_script_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "type": { "type": "string", "enum": ["ISOLATED", "MAIN"] },
            "jsScript": { "type": "string", "minLength": 1 }
        },
        "required": ["type", "jsScript"]
    })
}

fn console_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "includeExceptions": { "type": "boolean" },
            "maxMessages": { "type": "integer", "minimum": 1 }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_schema_compiles() {
        for entry in BASE.iter().chain(EXTENDED) {
            let schema = (entry.schema)();
            assert!(
                jsonschema::validator_for(&schema).is_ok(),
                "schema for {} does not compile",
                entry.name
            );
        }
    }

    #[test]
    fn names_are_unique() {
        let names = catalog_names(true);
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn extended_set_is_opt_in() {
        let base = catalog_names(false);
        let all = catalog_names(true);
        assert_eq!(base.len(), BASE.len());
        assert_eq!(all.len(), BASE.len() + EXTENDED.len());
        assert!(!base.contains(&"inject_script"));
        assert!(all.contains(&"inject_script"));
        assert_eq!(&all[..base.len()], &base[..]);
    }
}
