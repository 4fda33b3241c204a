// Terminal rendering of the task list

use crate::listeners::Subscription;
use crate::storage::Storage;
use crate::store::Store;
use colored::Colorize;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::warn;

/// Write the whole list followed by the remaining-count footer
pub fn render<S: Storage, W: Write>(store: &Store<S>, out: &mut W) -> io::Result<()> {
    let items = store.get_items();

    if items.is_empty() {
        writeln!(out, "{}", "Nothing to do.".dimmed())?;
    }

    for task in &items {
        if task.is_completed() {
            writeln!(
                out,
                "{} {}  {}",
                "[x]".green(),
                task.title().dimmed().strikethrough(),
                task.id().dimmed()
            )?;
        } else {
            writeln!(out, "[ ] {}  {}", task.title().bold(), task.id().dimmed())?;
        }
    }

    let remaining = items.iter().filter(|t| !t.is_completed()).count();
    writeln!(out, "{}", format!("{} remaining", remaining).cyan())?;

    Ok(())
}

/// Re-render to stdout after every committed change
///
/// The listener only holds a weak reference, so it never keeps the store alive.
pub fn mount<S: Storage + 'static>(store: &Rc<Store<S>>) -> Subscription {
    let weak = Rc::downgrade(store);
    store.subscribe(move || {
        let Some(store) = weak.upgrade() else {
            return;
        };
        if let Err(e) = render(&*store, &mut io::stdout().lock()) {
            warn!(error = ?e, "Failed to render task list");
        }
    })
}
