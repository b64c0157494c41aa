use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
   error::{DocumentError, Result, SourceError},
   source::{DocumentSource, SourceEntry},
};

enum Document {
   Ready(Value),
   Unavailable(String),
}

/// In-memory source for tests and for feeding documents fetched elsewhere.
#[derive(Default)]
pub struct MemorySource {
   documents: Vec<(String, Document)>,
   names:     HashMap<String, String>,
   outage:    Option<String>,
}

impl MemorySource {
   pub fn new() -> Self {
      Self::default()
   }

   /// A source whose every fetch fails.
   pub fn unavailable(reason: impl Into<String>) -> Self {
      Self { outage: Some(reason.into()), ..Self::default() }
   }

   #[must_use]
   pub fn with_document(mut self, player_id: impl Into<String>, document: Value) -> Self {
      self.documents.push((player_id.into(), Document::Ready(document)));
      self
   }

   /// Lists the player but fails to hand over its document.
   #[must_use]
   pub fn with_unavailable(mut self, player_id: impl Into<String>, reason: impl Into<String>) -> Self {
      self
         .documents
         .push((player_id.into(), Document::Unavailable(reason.into())));
      self
   }

   #[must_use]
   pub fn with_name(mut self, player_id: impl Into<String>, name: impl Into<String>) -> Self {
      self.names.insert(player_id.into(), name.into());
      self
   }

   fn check_outage(&self) -> Result<()> {
      match &self.outage {
         Some(reason) => Err(SourceError::Unavailable(reason.clone()).into()),
         None => Ok(()),
      }
   }
}

#[async_trait]
impl DocumentSource for MemorySource {
   async fn fetch_all(&self) -> Result<Vec<SourceEntry>> {
      self.check_outage()?;
      Ok(self
         .documents
         .iter()
         .map(|(id, doc)| match doc {
            Document::Ready(value) => SourceEntry::ok(id.clone(), value.clone()),
            Document::Unavailable(reason) => {
               SourceEntry::failed(id.clone(), DocumentError::Unavailable(reason.clone()))
            },
         })
         .collect())
   }

   async fn fetch_directory(&self) -> Result<HashMap<String, String>> {
      self.check_outage()?;
      Ok(self.names.clone())
   }
}
