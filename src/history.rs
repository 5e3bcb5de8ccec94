/*!
 # Session navigation history

 A session-scoped "where did I come from" record, independent of the host
 router's own history. Only the first non-root navigation of a session is
 recorded, so the stack is at most [`MAX_DEPTH`] entries deep.
*/

use tracing::{debug, trace};

use crate::settings::{SettingKey, SettingsStore};

/// Root route; navigations here are never recorded
pub const ROOT: &str = "/";

/// Maximum number of recorded entries
pub const MAX_DEPTH: usize = 1;

/// Back stack persisted write-through to session storage
#[derive(Debug)]
pub struct NavigationHistory {
    stack: Vec<String>,
    storage: SettingsStore,
}

impl NavigationHistory {
    /// Restores the stack from `storage`; malformed data starts empty
    pub fn new(storage: SettingsStore) -> Self {
        let mut stack: Vec<String> = storage.get(SettingKey::AppHistory, Vec::new());
        stack.truncate(MAX_DEPTH);
        debug!("Restored navigation history {:?}", stack);
        Self { stack, storage }
    }

    /// Records a completed navigation to `route`
    pub fn record(&mut self, route: &str) {
        if route == ROOT || self.stack.len() >= MAX_DEPTH {
            return;
        }
        if self.stack.last().map(String::as_str) == Some(route) {
            return;
        }
        self.stack.push(route.to_owned());
        trace!("History push {:?}", self.stack);
        self.save();
    }

    pub fn can_go_back(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Pops the top entry and returns the route to navigate to: the new
    /// top, or [`ROOT`] when nothing is left. `None` if the stack was empty.
    pub fn back(&mut self) -> Option<String> {
        self.stack.pop()?;
        trace!("History pop {:?}", self.stack);
        self.save();
        Some(self.stack.last().cloned().unwrap_or_else(|| ROOT.to_owned()))
    }

    pub fn entries(&self) -> &[String] {
        &self.stack
    }

    fn save(&self) {
        self.storage.set(SettingKey::AppHistory, &self.stack);
    }
}
