//! Desktop notifications for change events.

use anyhow::Result;
use notify_rust::Notification;
use untisync_core::diff::ChangeEvent;

pub fn send(events: &[ChangeEvent]) -> Result<()> {
    for event in events {
        Notification::new()
            .summary(&event.title)
            .body(&event.body)
            .appname("untisync")
            .show()?;
    }

    Ok(())
}
