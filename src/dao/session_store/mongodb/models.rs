use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{AnswerEntry, PlayerEntity, SessionEntity},
    scoring::Confidence,
    state::{
        grid::GridBoard,
        session::{QuizSnapshot, SessionConfig},
        state_machine::{QuestionStep, SessionStatus},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    join_code: String,
    host_id: String,
    status: SessionStatus,
    current_question_index: i64,
    question_step: Option<QuestionStep>,
    question_started_at: Option<DateTime>,
    quiz: QuizSnapshot,
    config: SessionConfig,
    grid: Option<GridBoard>,
    version: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    question_index: i64,
    option_index: i64,
    confidence: Option<Confidence>,
    award: i64,
    answered_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    display_name: String,
    score: i64,
    answers: Vec<MongoAnswerDocument>,
    joined_at: DateTime,
}

fn parse_id(value: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(value).map_err(|source| MongoDaoError::InvalidId {
        value: value.to_owned(),
        source,
    })
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            join_code: value.join_code,
            host_id: value.host_id,
            status: value.status,
            current_question_index: value.current_question_index,
            question_step: value.question_step,
            question_started_at: value.question_started_at.map(DateTime::from_system_time),
            quiz: value.quiz,
            config: value.config,
            grid: value.grid,
            version: i64::try_from(value.version).unwrap_or(i64::MAX),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            join_code: value.join_code,
            host_id: value.host_id,
            status: value.status,
            current_question_index: value.current_question_index,
            question_step: value.question_step,
            question_started_at: value.question_started_at.map(DateTime::to_system_time),
            quiz: value.quiz,
            config: value.config,
            grid: value.grid,
            version: u64::try_from(value.version).unwrap_or_default(),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<AnswerEntry> for MongoAnswerDocument {
    fn from(value: AnswerEntry) -> Self {
        Self {
            question_index: to_i64(value.question_index),
            option_index: to_i64(value.option_index),
            confidence: value.confidence,
            award: value.award,
            answered_at: DateTime::from_system_time(value.answered_at),
        }
    }
}

impl From<MongoAnswerDocument> for AnswerEntry {
    fn from(value: MongoAnswerDocument) -> Self {
        Self {
            question_index: to_usize(value.question_index),
            option_index: to_usize(value.option_index),
            confidence: value.confidence,
            award: value.award,
            answered_at: value.answered_at.to_system_time(),
        }
    }
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            display_name: value.display_name,
            score: value.score,
            answers: value.answers.into_iter().map(Into::into).collect(),
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            session_id: parse_id(&value.session_id)?,
            display_name: value.display_name,
            score: value.score,
            answers: value.answers.into_iter().map(Into::into).collect(),
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn session_filter(session_id: Uuid) -> Document {
    doc! {"session_id": session_id.to_string()}
}

pub fn player_filter(session_id: Uuid, player_id: Uuid) -> Document {
    doc! {"_id": player_id.to_string(), "session_id": session_id.to_string()}
}
