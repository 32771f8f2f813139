//! Due-date advancement for completed repeating tasks
//!
//! A repeating task that was completed reappears as active once its due
//! date has passed: the due date moves forward in whole `repeat_days`
//! steps until it is on or after today.

use chrono::{Days, NaiveDate};
use tracing::{debug, warn};

use crate::domain::{format_due_date, Graph, NodeId, TaskFields};

/// Number of skipped intervals past which an advance is logged as unusual
pub const LONG_OVERDUE_STEPS: u64 = 1000;

/// Advance every completed, overdue, repeating task.
///
/// Tasks that are not completed, have no valid due date, are not overdue,
/// or do not repeat are left untouched.
pub fn advance_recurring_tasks(graph: &Graph, today: NaiveDate) -> Graph {
    let updates: Vec<(NodeId, NaiveDate)> = graph
        .iter()
        .filter_map(|(id, node)| {
            let task = node.as_task()?;
            next_due_date(task, today).map(|due| (id.clone(), due))
        })
        .collect();

    if updates.is_empty() {
        return graph.clone();
    }

    let mut next = graph.clone();
    for (id, due) in updates {
        if let Some(task) = next.node_mut(id.as_str()).and_then(|n| n.as_task_mut()) {
            debug!(node = %id, due = %due, "advanced repeating task");
            task.due_date = Some(format_due_date(due));
            task.completed = false;
        }
    }
    next
}

/// The first `due + k * repeat_days` (k >= 1) that is on or after `today`,
/// or `None` if the task does not qualify.
fn next_due_date(task: &TaskFields, today: NaiveDate) -> Option<NaiveDate> {
    if !task.completed || task.repeat_days == 0 {
        return None;
    }
    let due = task.due()?;
    if due >= today {
        return None;
    }

    // whole intervals needed to reach today
    let repeat = u64::from(task.repeat_days);
    let behind = u64::try_from((today - due).num_days()).ok()?;
    let steps = behind.div_ceil(repeat);
    if steps > LONG_OVERDUE_STEPS {
        warn!(steps, repeat_days = task.repeat_days, "repeating task is far overdue");
    }
    due.checked_add_days(Days::new(steps.checked_mul(repeat)?))
}
