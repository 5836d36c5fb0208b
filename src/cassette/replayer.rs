//! Serves recorded interactions back in order.

use std::collections::HashMap;

use super::format::{Cassette, Interaction};
use crate::error::TatttyError;

/// Replays a cassette, one queue per `port::method` pair.
pub struct CassetteReplayer {
    queues: HashMap<(String, String), Vec<Interaction>>,
    cursors: HashMap<(String, String), usize>,
}

impl CassetteReplayer {
    /// Index a loaded cassette.
    #[must_use]
    pub fn new(cassette: &Cassette) -> Self {
        let mut queues: HashMap<(String, String), Vec<Interaction>> = HashMap::new();
        for interaction in &cassette.interactions {
            queues
                .entry((interaction.port.clone(), interaction.method.clone()))
                .or_default()
                .push(interaction.clone());
        }
        let cursors = queues.keys().map(|k| (k.clone(), 0)).collect();
        Self { queues, cursors }
    }

    /// Next interaction for the given port and method.
    ///
    /// # Errors
    ///
    /// Returns [`TatttyError::Config`] when nothing was recorded for the
    /// pair or when its queue has been consumed.
    pub fn next_interaction(
        &mut self,
        port: &str,
        method: &str,
    ) -> Result<&Interaction, TatttyError> {
        let key = (port.to_string(), method.to_string());

        let Some(queue) = self.queues.get(&key) else {
            let mut available: Vec<String> =
                self.queues.keys().map(|(p, m)| format!("{p}::{m}")).collect();
            available.sort();
            return Err(TatttyError::Config(format!(
                "Cassette has no interactions recorded for {port}::{method}. Available: [{}]",
                available.join(", ")
            )));
        };

        let cursor = self.cursors.entry(key).or_insert(0);
        let Some(interaction) = queue.get(*cursor) else {
            return Err(TatttyError::Config(format!(
                "Cassette exhausted: all {} interactions for {port}::{method} have been consumed.",
                queue.len()
            )));
        };
        *cursor += 1;
        Ok(interaction)
    }
}
