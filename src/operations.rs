/// Tab operations: bulk removal, undo placement, open-tab indices
use crate::tab_data::{Align, TabInfo};

/// Tabs selected for a bulk removal
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalPlan {
    pub active: TabInfo,
    pub candidates: Vec<TabInfo>,
}

/// Sort tabs so that those on the `align` side of the active tab come after it
pub fn sort_for_removal(tabs: &mut [TabInfo], align: Align) {
    tabs.sort_by(|a, b| {
        let order = a.index.cmp(&b.index);
        match align {
            Align::Right => order,
            Align::Left => order.reverse(),
        }
    });
}

/// Collect every tab beyond the active one in `align` direction
///
/// Returns `None` when no tab is active.
pub fn plan_removal(tabs: &[TabInfo], align: Align) -> Option<RemovalPlan> {
    let mut sorted = tabs.to_vec();
    sort_for_removal(&mut sorted, align);

    let position = sorted.iter().position(|tab| tab.active)?;
    let candidates = sorted.split_off(position + 1);
    let active = sorted.swap_remove(position);

    Some(RemovalPlan { active, candidates })
}

/// Index to reopen the `offset`-th removed tab at during undo
pub fn undo_index(align: Align, active_index: i32, offset: usize) -> i32 {
    match align {
        Align::Right => active_index + 1 + offset as i32,
        // Reopened in nearest-first order, each insert pushes the previous one right
        Align::Left => active_index,
    }
}

/// Placement of tabs opened from links
///
/// Consecutive opens continue after the previous one until a topology change
/// resets the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenCursor {
    last: Option<i32>,
}

impl OpenCursor {
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn next_index(&mut self, requested: Option<i32>, current_index: i32) -> i32 {
        if let Some(index) = requested {
            return index;
        }

        let index = match self.last {
            Some(last) => last + 1,
            None => current_index + 1,
        };
        self.last = Some(index);
        index
    }
}
