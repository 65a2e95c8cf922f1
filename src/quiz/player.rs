use crate::storage::{KeyValueStore, StoreError};

const USERNAME_KEY: &str = "username";

/// The player of the current session, if there is one.
///
/// Blank names count as no player. A store that can't be read counts as
/// no player too.
pub fn active(session: &dyn KeyValueStore) -> Option<String> {
    match session.get(USERNAME_KEY) {
        Ok(name) => name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
        Err(err) => {
            log::warn!("Unable to read the session player: {}", err);
            None
        }
    }
}

pub fn remember(session: &dyn KeyValueStore, name: &str) -> Result<(), StoreError> {
    session.set(USERNAME_KEY, name)
}

pub fn forget(session: &dyn KeyValueStore) -> Result<(), StoreError> {
    session.clear(USERNAME_KEY)
}
