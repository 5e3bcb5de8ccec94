/*!
 # Screen routes

 The three screens of the application and the read-only registry the
 `app/{id}` detail screen is looked up in. [`Router`] records every completed
 navigation in the session [`NavigationHistory`].
*/

use std::fmt;

use tracing::{debug, info, instrument};

use crate::history::{NavigationHistory, ROOT};
use crate::settings::SettingsStore;
use crate::{Error, Result};

/// A navigable screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Preferences,
    App(String),
}

impl Route {
    /// Parses a path such as `/`, `/preferences` or `/app/uuid`
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim().trim_matches('/');
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(""), None, None) => Ok(Route::Home),
            (Some("preferences"), None, None) => Ok(Route::Preferences),
            (Some("app"), Some(id), None) if !id.is_empty() => Ok(Route::App(id.to_owned())),
            _ => Err(Error::UnknownRoute(path.to_owned())),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => ROOT.to_owned(),
            Route::Preferences => "/preferences".to_owned(),
            Route::App(id) => format!("/app/{}", id),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// An entry of the application registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEntry {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl AppEntry {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            description: description.to_owned(),
        }
    }
}

/// Read-only lookup table of applications by id
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    entries: Vec<AppEntry>,
}

impl AppRegistry {
    pub fn new(entries: Vec<AppEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&AppEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppEntry> {
        self.entries.iter()
    }
}

/// Current screen plus the session back stack
#[derive(Debug)]
pub struct Router {
    registry: AppRegistry,
    history: NavigationHistory,
    current: Route,
}

impl Router {
    /// Starts on the home screen with history restored from `session`
    pub fn new(registry: AppRegistry, session: SettingsStore) -> Self {
        Self {
            registry,
            history: NavigationHistory::new(session),
            current: Route::Home,
        }
    }

    pub fn current(&self) -> &Route {
        &self.current
    }

    /// The registry entry of the current screen, if it is a detail screen
    pub fn current_app(&self) -> Option<&AppEntry> {
        match &self.current {
            Route::App(id) => self.registry.get(id),
            _ => None,
        }
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    pub fn can_go_back(&self) -> bool {
        self.history.can_go_back()
    }

    #[instrument(skip(self))]
    pub fn navigate(&mut self, path: &str) -> Result<&Route> {
        let route = Route::parse(path)?;
        if let Route::App(id) = &route {
            if self.registry.get(id).is_none() {
                return Err(Error::UnknownApp(id.clone()));
            }
        }
        self.complete(route);
        Ok(&self.current)
    }

    /// Goes back one entry. Returns the new screen, or `None` if there was
    /// nothing to go back to.
    pub fn back(&mut self) -> Option<&Route> {
        let target = self.history.back()?;
        let route = Route::parse(&target).unwrap_or_else(|e| {
            debug!("Stored history entry is not a route ({}), going home", e);
            Route::Home
        });
        self.complete(route);
        Some(&self.current)
    }

    fn complete(&mut self, route: Route) {
        info!("Navigated to {}", route);
        self.history.record(&route.path());
        self.current = route;
    }
}
