use crate::rpc::error::{Error, Result};
use crate::rpc::protocol::{response_id, Response};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Responses of a fired batch, retrievable by correlation id.
///
/// Responses without an id (servers that fail to echo it on error) land in a separate bucket
/// used as a fallback for any id.
#[derive(Debug, Default)]
pub struct BatchResponses {
    ids: Vec<String>,
    by_id: HashMap<Option<String>, VecDeque<Value>>,
}

impl BatchResponses {
    /// Index `responses` by id. `ids` are request ids in submission order (notifications excluded).
    pub fn new(responses: Vec<Value>, ids: Vec<String>) -> Self {
        let mut by_id: HashMap<Option<String>, VecDeque<Value>> = HashMap::new();
        for response in responses {
            let id = response_id(response.get("id"));
            by_id.entry(id).or_default().push_back(response);
        }
        Self { ids, by_id }
    }

    /// Request ids in submission order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Pop the response for `id` and return its result.
    ///
    /// Each response is returned at most once, a second retrieval of the same id fails with
    /// [`Error::AlreadyRetrieved`] unless a null-id response is still available.
    pub fn get(&mut self, id: &str) -> Result<Value> {
        let response = self
            .pop(Some(id.to_string()))
            .or_else(|| self.pop(None))
            .ok_or_else(|| Error::AlreadyRetrieved(Some(id.to_string())))?;
        Response::from_value(response)?.into_result()
    }

    fn pop(&mut self, id: Option<String>) -> Option<Value> {
        self.by_id.get_mut(&id)?.pop_front()
    }

    /// Retrieve every result in submission order.
    pub fn into_results(mut self) -> Vec<Result<Value>> {
        let ids = std::mem::take(&mut self.ids);
        ids.iter().map(|id| self.get(id)).collect()
    }
}
