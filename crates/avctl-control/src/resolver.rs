//! State Resolver: poll the configured status channels concurrently and
//! reduce their answers with the pure policies in `avctl_core::reduce`.
//!
//! Nothing here polls on its own; every call is driven by a caller asking
//! for a property.

use std::collections::HashMap;

use avctl_core::reduce::{match_boolean, reduce_boolean, select_input, valid_inputs};
use avctl_core::{
    BooleanQuery, BooleanStatus, ChannelKind, ChannelName, ControlError, InputProfile, InputQuery,
    InputSelection, Property,
};
use futures_util::future::join_all;

use crate::registry::ChannelRegistry;

#[derive(Debug, Clone)]
pub struct Resolver {
    registry: ChannelRegistry,
}

impl Resolver {
    pub fn new(registry: ChannelRegistry) -> Self {
        Self { registry }
    }

    /// Resolve a boolean property.
    ///
    /// `None` when there is nothing to go on: no status channels configured
    /// (no transport call is made), or no channel answered. The caller
    /// keeps its last-known value in that case.
    pub async fn resolve_boolean(&self, property: Property, status: Option<&BooleanStatus>) -> Option<bool> {
        let status = status.filter(|s| !s.queries.is_empty())?;

        let readings = join_all(status.queries.iter().map(|q| self.read_boolean(q))).await;
        let value = reduce_boolean(status.policy, &readings);

        match value {
            Some(v) => tracing::debug!(
                %property,
                policy = ?status.policy,
                channels = readings.len(),
                failed = readings.iter().filter(|r| r.is_err()).count(),
                value = v,
                "boolean status resolved"
            ),
            None => tracing::warn!(%property, "no status channel answered, keeping last-known value"),
        }
        value
    }

    async fn read_boolean(&self, q: &BooleanQuery) -> Result<bool, ControlError> {
        let response = self.query(&q.channel, &q.query).await?;
        let reading = match_boolean(&q.channel, &response, &q.on, &q.off);
        if let Err(e) = &reading {
            tracing::warn!(channel = %q.channel, error = %e, "status response matched neither pattern");
        }
        reading
    }

    /// Resolve the active input.
    ///
    /// Queries every input status channel, then keeps the inputs whose
    /// expectations all hold. Ties prefer `last_known` when it is among the
    /// candidates, else the first in declaration order.
    pub async fn resolve_input(
        &self,
        queries: &[InputQuery],
        inputs: &[InputProfile],
        last_known: usize,
    ) -> InputSelection {
        if queries.is_empty() || inputs.is_empty() {
            return InputSelection::Unresolved;
        }

        let answers = join_all(queries.iter().map(|q| async move {
            (q.channel.clone(), self.query(&q.channel, &q.query).await)
        }))
        .await;

        let mut responses: HashMap<ChannelName, String> = HashMap::with_capacity(answers.len());
        for (channel, answer) in answers {
            match answer {
                Ok(response) => {
                    responses.insert(channel, response);
                }
                Err(e) => tracing::debug!(channel = %channel, error = %e, "input status query failed"),
            }
        }

        let valid = valid_inputs(inputs.iter().map(|i| &i.expect), &responses);
        let selection = select_input(&valid, last_known);

        match &selection {
            InputSelection::Unresolved => {
                tracing::debug!(responses = responses.len(), "no input matched, keeping last-known")
            }
            InputSelection::Unique { index } => tracing::debug!(index, "input resolved"),
            InputSelection::Ambiguous {
                index,
                candidates,
                kept,
            } => tracing::info!(
                index,
                ?candidates,
                kept,
                "several inputs match the status responses"
            ),
        }
        selection
    }

    async fn query(&self, channel: &ChannelName, command: &str) -> Result<String, ControlError> {
        match self.registry.line(channel.as_str()) {
            Some(line) => line.send(command).await,
            None => Err(ControlError::Configuration {
                channel: channel.clone(),
                kind: ChannelKind::Line,
            }),
        }
    }
}
