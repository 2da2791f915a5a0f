//! Named-entity extraction.
//!
//! Replies must match a fixed shape per category; anything else is
//! malformed output. People, organizations and locations are then merged
//! case-insensitively by name with their mentions summed.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::decode::from_value;
use super::llm::{ChatRequest, PromptRunner};
use super::{elapsed_secs, AnalysisAgent, AnalysisPayload};
use crate::config::schema::ENTITY_EXTRACTOR;
use crate::error::TaskError;

const INSTRUCTIONS: &str = "You are an expert entity extraction specialist. Identify and \
categorize entities with supporting context.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub name: String,
    pub role: String,
    pub mentions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub mentions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateMention {
    pub date: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonetaryValue {
    pub amount: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityResult {
    pub people: Vec<Person>,
    pub organizations: Vec<NamedEntity>,
    pub dates: Vec<DateMention>,
    pub locations: Vec<NamedEntity>,
    pub monetary_values: Vec<MonetaryValue>,
    pub processing_time: f64,
}

impl EntityResult {
    pub fn validate(&self) -> Result<(), TaskError> {
        let blank_name = self.people.iter().any(|p| p.name.trim().is_empty())
            || self
                .organizations
                .iter()
                .chain(self.locations.iter())
                .any(|e| e.name.trim().is_empty());
        if blank_name {
            return Err(TaskError::MalformedOutput(
                "entity names must be non-empty".to_string(),
            ));
        }
        let zero_mentions = self.people.iter().any(|p| p.mentions == 0)
            || self
                .organizations
                .iter()
                .chain(self.locations.iter())
                .any(|e| e.mentions == 0);
        if zero_mentions {
            return Err(TaskError::MalformedOutput(
                "entity mentions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Reply shape ────────────────────────────────────────────────────────────

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PersonReply {
    name: String,
    #[serde(default)]
    role: String,
    #[serde(default = "one")]
    mentions: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NamedReply {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default = "one")]
    mentions: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DateReply {
    date: String,
    #[serde(default)]
    context: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoneyReply {
    amount: String,
    #[serde(default)]
    context: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EntityReply {
    #[serde(default)]
    people: Vec<PersonReply>,
    #[serde(default)]
    organizations: Vec<NamedReply>,
    #[serde(default)]
    dates: Vec<DateReply>,
    #[serde(default)]
    locations: Vec<NamedReply>,
    #[serde(default)]
    monetary_values: Vec<MoneyReply>,
}

// ─── Normalization ──────────────────────────────────────────────────────────

fn floor_mentions(mentions: i64) -> u32 {
    u32::try_from(mentions.max(1)).unwrap_or(u32::MAX)
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn context_or_default(context: &str, label: &str) -> String {
    non_blank(context).unwrap_or_else(|| format!("Mentioned {} in document.", label))
}

/// Merges entries with the same case-insensitive name, keeping the first
/// entry's details and summing mentions. Order of first appearance is kept.
fn dedup_by_name<T>(
    items: Vec<(String, T)>,
    mentions_of: impl Fn(&mut T) -> &mut u32,
) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<T> = Vec::new();
    for (name, mut item) in items {
        let key = name.to_lowercase();
        match index.get(&key) {
            Some(&pos) => {
                let extra = *mentions_of(&mut item);
                let total = mentions_of(&mut merged[pos]);
                *total = total.saturating_add(extra);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

fn named(replies: Vec<NamedReply>) -> Vec<NamedEntity> {
    let items = replies
        .into_iter()
        .filter_map(|reply| {
            let name = non_blank(&reply.name)?;
            let entity = NamedEntity {
                name: name.clone(),
                kind: reply.kind.trim().to_string(),
                mentions: floor_mentions(reply.mentions),
            };
            Some((name, entity))
        })
        .collect();
    dedup_by_name(items, |e| &mut e.mentions)
}

impl EntityReply {
    pub(crate) fn into_result(self, processing_time: f64) -> EntityResult {
        let people = self
            .people
            .into_iter()
            .filter_map(|reply| {
                let name = non_blank(&reply.name)?;
                let person = Person {
                    name: name.clone(),
                    role: reply.role.trim().to_string(),
                    mentions: floor_mentions(reply.mentions),
                };
                Some((name, person))
            })
            .collect();

        EntityResult {
            people: dedup_by_name(people, |p| &mut p.mentions),
            organizations: named(self.organizations),
            dates: self
                .dates
                .into_iter()
                .filter_map(|reply| {
                    Some(DateMention {
                        date: non_blank(&reply.date)?,
                        context: context_or_default(&reply.context, "date"),
                    })
                })
                .collect(),
            locations: named(self.locations),
            monetary_values: self
                .monetary_values
                .into_iter()
                .filter_map(|reply| {
                    Some(MonetaryValue {
                        amount: non_blank(&reply.amount)?,
                        context: context_or_default(&reply.context, "monetary"),
                    })
                })
                .collect(),
            processing_time,
        }
    }
}

// ─── Agent ──────────────────────────────────────────────────────────────────

pub struct EntityExtractorAgent {
    runner: PromptRunner,
}

impl EntityExtractorAgent {
    pub fn new(runner: PromptRunner) -> Self {
        Self { runner }
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new(
            INSTRUCTIONS,
            format!(
                "Document for analysis:\n\"\"\"{}\"\"\"\n\n\
                 Extract people (with role), organizations (with type), dates, locations \
                 (with type) and monetary values. Give a short context for each entity and \
                 count mentions for people, organizations and locations. Return at most 5 \
                 entities per category. Respond only with JSON of this exact shape: \
                 {{\"people\": [{{\"name\", \"role\", \"mentions\"}}], \
                 \"organizations\": [{{\"name\", \"type\", \"mentions\"}}], \
                 \"dates\": [{{\"date\", \"context\"}}], \
                 \"locations\": [{{\"name\", \"type\", \"mentions\"}}], \
                 \"monetary_values\": [{{\"amount\", \"context\"}}]}}.",
                text
            ),
        )
    }
}

#[async_trait]
impl AnalysisAgent for EntityExtractorAgent {
    fn name(&self) -> &str {
        ENTITY_EXTRACTOR
    }

    async fn process(&self, text: &str) -> Result<AnalysisPayload, TaskError> {
        let start = Instant::now();
        if text.trim().is_empty() {
            return Err(TaskError::Failed(
                "Document text is required for entity extraction.".to_string(),
            ));
        }

        let value = self
            .runner
            .run_json(ENTITY_EXTRACTOR, Self::request(text))
            .await?;
        let reply: EntityReply = from_value(value)?;

        let result = reply.into_result(elapsed_secs(start));
        result.validate()?;
        Ok(AnalysisPayload::Entities(result))
    }
}
