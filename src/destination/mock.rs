//! In-memory recording destination for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{Destination, DestinationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(String),
    Delete(String),
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<String, Vec<u8>>,
    events: Vec<Event>,
}

#[derive(Default, Clone)]
pub struct MockDestination {
    state: Arc<Mutex<MockState>>,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, filename: &str, data: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(filename.to_string(), data.to_vec());
        self
    }

    pub fn object(&self, filename: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(filename).cloned()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }
}

impl Destination for MockDestination {
    fn location(&self) -> &str {
        "mock://"
    }

    fn has(&self, filename: &str) -> Result<bool, DestinationError> {
        Ok(self.state.lock().unwrap().objects.contains_key(filename))
    }

    fn write(&self, filename: &str, data: &[u8]) -> Result<(), DestinationError> {
        let mut state = self.state.lock().unwrap();
        state.objects.insert(filename.to_string(), data.to_vec());
        state.events.push(Event::Write(filename.to_string()));
        Ok(())
    }

    fn delete(&self, filenames: &[String]) -> Result<(), DestinationError> {
        let mut state = self.state.lock().unwrap();
        for filename in filenames {
            state.objects.remove(filename);
            state.events.push(Event::Delete(filename.clone()));
        }
        Ok(())
    }
}
