//! Request policy of the reference home screen.
//!
//! Accepted shortcuts are recorded in the store; the handler's verdict is the
//! store's outcome translated to a result code.

use homeshortcut_core::{
    LaunchKind, ShortcutError, ShortcutHandler, ShortcutRecord, ShortcutRequest, ShortcutStore,
};
use serde::Serialize;
use tracing::{info, warn};

/// Extra data stored for widgets.
#[derive(Serialize)]
struct WidgetExtra<'a> {
    content: &'a str,
    period: f64,
}

/// Handler that records accepted shortcuts in a [`ShortcutStore`].
#[derive(Clone)]
pub struct StoreHandler<S> {
    store: S,
    allow_widgets: bool,
}

impl<S: ShortcutStore> StoreHandler<S> {
    pub fn new(store: S, allow_widgets: bool) -> Self {
        Self {
            store,
            allow_widgets,
        }
    }

    fn accept(&self, request: &ShortcutRequest) -> homeshortcut_core::Result<ShortcutRecord> {
        let package = request
            .package
            .as_deref()
            .ok_or_else(|| ShortcutError::invalid("request without a package name"))?;
        let name = request
            .name
            .as_deref()
            .ok_or_else(|| ShortcutError::invalid("request without a display name"))?;
        let launch = request.launch_kind().ok_or_else(|| {
            ShortcutError::NotSupported(format!("launch kind {}", request.shortcut_type))
        })?;

        let mut record = ShortcutRecord::new(package, name);
        record.icon = request.icon.clone();

        match request.period {
            Some(period) => {
                if !self.allow_widgets {
                    return Err(ShortcutError::NotSupported("widgets".to_string()));
                }
                let extra = WidgetExtra {
                    content: request.content(),
                    period,
                };
                record = record.with_extra("widget", serde_json::to_string(&extra)?);
            }
            None => {
                if let Some(content) = &request.content {
                    let key = match launch {
                        LaunchKind::Package => "package",
                        LaunchKind::Uri => "uri",
                    };
                    record = record.with_extra(key, content.clone());
                }
            }
        }

        self.store.insert(&record)?;
        Ok(record)
    }
}

impl<S: ShortcutStore + 'static> ShortcutHandler for StoreHandler<S> {
    fn handle(&self, request: &ShortcutRequest, sender_pid: i32) -> i32 {
        match self.accept(request) {
            Ok(record) => {
                info!(
                    "Added {} '{}' for {} (pid {})",
                    if request.is_widget() { "widget" } else { "shortcut" },
                    record.name,
                    record.package,
                    sender_pid
                );
                0
            }
            Err(e) => {
                warn!("Rejected request from pid {}: {}", sender_pid, e);
                e.to_result_code()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeshortcut_core::SqliteShortcutStore;

    fn handler(allow_widgets: bool) -> StoreHandler<SqliteShortcutStore> {
        StoreHandler::new(SqliteShortcutStore::open_in_memory().unwrap(), allow_widgets)
    }

    #[test]
    fn test_accepts_and_records_shortcut() {
        let handler = handler(true);
        let request = ShortcutRequest::new("com.example.web", "Docs", LaunchKind::Uri)
            .with_content("https://example.org/docs")
            .with_icon("/icons/docs.png");

        assert_eq!(handler.handle(&request, 100), 0);

        let stored = handler.store.get_shortcuts(Some("com.example.web")).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].extra_key.as_deref(), Some("uri"));
        assert_eq!(stored[0].extra_data.as_deref(), Some("https://example.org/docs"));
        assert_eq!(stored[0].icon.as_deref(), Some("/icons/docs.png"));
    }

    #[test]
    fn test_missing_package_is_invalid() {
        let handler = handler(true);
        let request = ShortcutRequest {
            name: Some("Docs".to_string()),
            ..ShortcutRequest::default()
        };
        assert_eq!(handler.handle(&request, 100), -libc::EINVAL);
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let handler = handler(true);
        let request = ShortcutRequest::new("com.example.mail", "Inbox", LaunchKind::Package);

        assert_eq!(handler.handle(&request, 100), 0);
        assert_eq!(handler.handle(&request, 100), -libc::EEXIST);
    }

    #[test]
    fn test_widget_policy() {
        let request = ShortcutRequest::new("com.example.clock", "Clock", LaunchKind::Package)
            .with_content("clock://face")
            .with_period(600.0);

        assert_eq!(handler(false).handle(&request, 100), -libc::ENOTSUP);

        let handler = handler(true);
        assert_eq!(handler.handle(&request, 100), 0);
        let stored = handler.store.get_shortcuts(None).unwrap();
        assert_eq!(stored[0].extra_key.as_deref(), Some("widget"));
        let extra: serde_json::Value =
            serde_json::from_str(stored[0].extra_data.as_deref().unwrap()).unwrap();
        assert_eq!(extra["period"], 600.0);
        assert_eq!(extra["content"], "clock://face");
    }
}
