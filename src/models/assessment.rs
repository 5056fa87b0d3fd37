use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

/// A score in `MIN_SCORE..=MAX_SCORE`. The database enforces the same range
/// with CHECK constraints.
#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[sqlx(transparent)]
#[serde(try_from = "i32", into = "i32")]
pub struct Score(i32);

impl Score {
    pub fn value(self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for Score {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (MIN_SCORE..=MAX_SCORE).contains(&value) {
            Ok(Score(value))
        } else {
            Err(format!("Score must be between {} and {}, got {}", MIN_SCORE, MAX_SCORE, value))
        }
    }
}

impl From<Score> for i32 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Manager score wins over self score; `None` when neither party has assessed.
pub fn effective_score(self_score: Option<Score>, manager_score: Option<Score>) -> Option<Score> {
    manager_score.or(self_score)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    SelfScore,
    ManagerScore,
}

impl ScoreField {
    /// Column name in `skill_assessments`; also the value stored in
    /// `assessment_history.field_changed`.
    pub fn column(&self) -> &'static str {
        match self {
            ScoreField::SelfScore => "self_score",
            ScoreField::ManagerScore => "manager_score",
        }
    }

    pub fn change_note(&self) -> &'static str {
        match self {
            ScoreField::SelfScore => "Self-assessment changed",
            ScoreField::ManagerScore => "Manager assessment changed",
        }
    }
}

impl fmt::Display for ScoreField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl TryFrom<String> for ScoreField {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "self_score" => Ok(ScoreField::SelfScore),
            "manager_score" => Ok(ScoreField::ManagerScore),
            other => Err(format!("unknown score field '{}'", other)),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct SkillAssessment {
    pub id: i64,
    pub user_id: i64,
    pub skill_id: i64,
    pub self_score: Option<Score>,
    pub manager_score: Option<Score>,
    pub assessed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SkillAssessment {
    pub fn score(&self, field: ScoreField) -> Option<Score> {
        match field {
            ScoreField::SelfScore => self.self_score,
            ScoreField::ManagerScore => self.manager_score,
        }
    }

    pub fn set_score(&mut self, field: ScoreField, value: Option<Score>) {
        match field {
            ScoreField::SelfScore => self.self_score = value,
            ScoreField::ManagerScore => self.manager_score = value,
        }
    }

    pub fn final_score(&self) -> Option<Score> {
        effective_score(self.self_score, self.manager_score)
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct AssessmentHistory {
    pub id: i64,
    pub assessment_id: i64,
    #[sqlx(try_from = "String")]
    pub field_changed: ScoreField,
    pub old_value: Option<Score>,
    pub new_value: Option<Score>,
    pub changed_by: Option<i64>,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Score columns of one assessment, as read by the aggregation queries.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ScorePair {
    pub user_id: i64,
    pub skill_id: i64,
    pub self_score: Option<Score>,
    pub manager_score: Option<Score>,
}

impl ScorePair {
    pub fn final_score(&self) -> Option<Score> {
        effective_score(self.self_score, self.manager_score)
    }
}
