//! Read-side statistics. The SQL here only fetches rows; every figure is
//! computed by the plain functions at the top of the module so the
//! precedence and averaging rules live in one place.

use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use crate::errors::AppError;
use crate::models::assessment::{effective_score, Score, ScorePair};
use crate::models::department::Department;
use crate::models::principal::Principal;
use crate::models::skill::Skill;
use crate::models::user::{Role, UserScope};
use crate::services::access;

pub const NO_DEPARTMENT: &str = "No department";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DepartmentSummary {
    pub department_id: Option<i64>,
    pub department: String,
    pub count: i64,
    pub avg_score: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: i64,
    pub assessed_skills: i64,
    pub total_skills: i64,
    pub avg_self_score: Option<f64>,
    pub avg_final_score: Option<f64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OverallStats {
    pub total_users: i64,
    pub total_skills: i64,
    pub assessed_skills: i64,
    pub avg_score: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HrReport {
    pub stats: OverallStats,
    pub roles: BTreeMap<Role, i64>,
    pub departments: Vec<DepartmentSummary>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct TeamMemberRow {
    pub id: i64,
    pub full_name: String,
    pub login: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub position: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TeamMember {
    #[serde(flatten)]
    pub member: TeamMemberRow,
    pub assessments_count: i64,
    pub avg_self_score: Option<f64>,
    pub avg_manager_score: Option<f64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TeamOverview {
    pub department_id: Option<i64>,
    pub team_count: i64,
    pub pending_reviews: i64,
    pub members: Vec<TeamMember>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct SkillMatch {
    pub id: i64,
    pub full_name: String,
    pub login: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub position: Option<String>,
    pub department_id: Option<i64>,
    pub department: Option<String>,
    pub self_score: Option<Score>,
    pub manager_score: Option<Score>,
    #[sqlx(skip)]
    pub final_score: Option<Score>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SkillSearch {
    pub skill: Skill,
    pub min_score: Score,
    pub users: Vec<SkillMatch>,
    pub total_found: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub skill_id: i64,
    pub skill_name: String,
    pub category: String,
    pub user1_score: Option<Score>,
    pub user2_score: Option<Score>,
    pub difference: Option<i32>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct SkillProfileEntry {
    pub skill_id: i64,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub self_score: Option<Score>,
    pub manager_score: Option<Score>,
    pub assessed_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub final_score: Option<Score>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Dashboard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessed_skills: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_skills: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_reviews: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_users: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_departments: Option<i64>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Mean rounded to one decimal place; `None` for an empty input.
pub fn mean<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = Score>,
{
    let (sum, count) = scores
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), score| (sum + i64::from(score.value()), count + 1));
    if count == 0 {
        None
    } else {
        Some(round1(sum as f64 / count as f64))
    }
}

pub fn department_summary(
    departments: &[Department],
    users: &[UserScope],
    scores: &[ScorePair],
) -> Vec<DepartmentSummary> {
    let department_of: HashMap<i64, Option<i64>> =
        users.iter().map(|u| (u.id, u.department_id)).collect();

    let mut user_counts: HashMap<Option<i64>, i64> = HashMap::new();
    for user in users {
        *user_counts.entry(user.department_id).or_default() += 1;
    }

    let mut finals: HashMap<Option<i64>, Vec<Score>> = HashMap::new();
    for pair in scores {
        let Some(department) = department_of.get(&pair.user_id) else {
            continue;
        };
        if let Some(score) = pair.final_score() {
            finals.entry(*department).or_default().push(score);
        }
    }

    let summarize = |department_id: Option<i64>, name: String| DepartmentSummary {
        department_id,
        department: name,
        count: user_counts.get(&department_id).copied().unwrap_or(0),
        avg_score: finals
            .get(&department_id)
            .and_then(|scores| mean(scores.iter().copied()))
            .unwrap_or(0.0),
    };

    let mut ordered: Vec<&Department> = departments.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let mut summaries: Vec<DepartmentSummary> = ordered
        .into_iter()
        .map(|d| summarize(Some(d.id), d.name.clone()))
        .collect();

    if user_counts.contains_key(&None) {
        summaries.push(summarize(None, NO_DEPARTMENT.to_string()));
    }
    summaries
}

pub fn role_counts(users: &[UserScope]) -> BTreeMap<Role, i64> {
    let mut counts: BTreeMap<Role, i64> = Role::ALL.iter().map(|role| (*role, 0)).collect();
    for user in users {
        *counts.entry(user.role).or_default() += 1;
    }
    counts
}

pub fn user_summary(user_id: i64, scores: &[ScorePair], total_skills: i64) -> UserSummary {
    let own: Vec<&ScorePair> = scores.iter().filter(|p| p.user_id == user_id).collect();
    UserSummary {
        user_id,
        assessed_skills: own.iter().filter(|p| p.final_score().is_some()).count() as i64,
        total_skills,
        avg_self_score: mean(own.iter().filter_map(|p| p.self_score)),
        avg_final_score: mean(own.iter().filter_map(|p| p.final_score())),
    }
}

pub fn overall_stats(total_users: i64, total_skills: i64, scores: &[ScorePair]) -> OverallStats {
    let finals: Vec<Score> = scores.iter().filter_map(|p| p.final_score()).collect();
    OverallStats {
        total_users,
        total_skills,
        assessed_skills: finals.len() as i64,
        avg_score: mean(finals).unwrap_or(0.0),
    }
}

pub fn team_overview(
    department_id: Option<i64>,
    members: Vec<TeamMemberRow>,
    scores: &[ScorePair],
) -> TeamOverview {
    let pending_reviews = scores
        .iter()
        .filter(|p| p.self_score.is_some() && p.manager_score.is_none())
        .count() as i64;

    let members: Vec<TeamMember> = members
        .into_iter()
        .map(|member| {
            let own: Vec<&ScorePair> = scores.iter().filter(|p| p.user_id == member.id).collect();
            TeamMember {
                assessments_count: own.len() as i64,
                avg_self_score: mean(own.iter().filter_map(|p| p.self_score)),
                avg_manager_score: mean(own.iter().filter_map(|p| p.manager_score)),
                member,
            }
        })
        .collect();

    TeamOverview {
        department_id,
        team_count: members.len() as i64,
        pending_reviews,
        members,
    }
}

/// Keeps candidates the principal may see whose effective score reaches
/// `min_score`, best first.
pub fn filter_skill_matches(
    principal: &Principal,
    candidates: Vec<SkillMatch>,
    min_score: Score,
) -> Vec<SkillMatch> {
    let mut matches: Vec<SkillMatch> = candidates
        .into_iter()
        .map(|mut candidate| {
            candidate.final_score = effective_score(candidate.self_score, candidate.manager_score);
            candidate
        })
        .filter(|candidate| candidate.final_score.is_some_and(|score| score >= min_score))
        .filter(|candidate| {
            let scope = UserScope {
                id: candidate.id,
                role: candidate.role,
                department_id: candidate.department_id,
            };
            access::can_view(principal, &scope).is_ok()
        })
        .collect();
    matches.sort_by(|a, b| {
        b.final_score
            .cmp(&a.final_score)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    matches
}

/// Per-skill comparison of two users. `difference` is `user2 - user1`, a
/// missing score counting as zero, and `None` when neither user is scored.
pub fn compare(skills: &[Skill], user1: &[ScorePair], user2: &[ScorePair]) -> Vec<ComparisonRow> {
    let finals = |pairs: &[ScorePair]| -> HashMap<i64, Score> {
        pairs
            .iter()
            .filter_map(|p| p.final_score().map(|score| (p.skill_id, score)))
            .collect()
    };
    let first = finals(user1);
    let second = finals(user2);

    skills
        .iter()
        .map(|skill| {
            let user1_score = first.get(&skill.id).copied();
            let user2_score = second.get(&skill.id).copied();
            let difference = match (user1_score, user2_score) {
                (None, None) => None,
                (a, b) => Some(b.map_or(0, Score::value) - a.map_or(0, Score::value)),
            };
            ComparisonRow {
                skill_id: skill.id,
                skill_name: skill.name.clone(),
                category: skill.category.clone(),
                user1_score,
                user2_score,
                difference,
            }
        })
        .collect()
}

async fn load_user_scopes(pool: &PgPool) -> Result<Vec<UserScope>, AppError> {
    let users = sqlx::query_as::<_, UserScope>("SELECT id, role, department_id FROM users")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

async fn load_scores(pool: &PgPool) -> Result<Vec<ScorePair>, AppError> {
    let scores = sqlx::query_as::<_, ScorePair>(
        "SELECT user_id, skill_id, self_score, manager_score FROM skill_assessments",
    )
    .fetch_all(pool)
    .await?;
    Ok(scores)
}

async fn load_user_scores(pool: &PgPool, user_id: i64) -> Result<Vec<ScorePair>, AppError> {
    let scores = sqlx::query_as::<_, ScorePair>(
        "SELECT user_id, skill_id, self_score, manager_score FROM skill_assessments WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(scores)
}

async fn count(pool: &PgPool, table: &str) -> Result<i64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let total: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(total)
}

async fn load_skills(pool: &PgPool) -> Result<Vec<Skill>, AppError> {
    let skills = sqlx::query_as::<_, Skill>(
        "SELECT id, name, category, description, created_at, updated_at FROM skills ORDER BY category, name",
    )
    .fetch_all(pool)
    .await?;
    Ok(skills)
}

async fn load_departments(pool: &PgPool) -> Result<Vec<Department>, AppError> {
    let departments = sqlx::query_as::<_, Department>(
        "SELECT id, name, manager_id, created_at, updated_at FROM departments",
    )
    .fetch_all(pool)
    .await?;
    Ok(departments)
}

pub async fn load_department_summary(pool: &PgPool) -> Result<Vec<DepartmentSummary>, AppError> {
    let departments = load_departments(pool).await?;
    let users = load_user_scopes(pool).await?;
    let scores = load_scores(pool).await?;
    Ok(department_summary(&departments, &users, &scores))
}

pub async fn load_role_counts(pool: &PgPool) -> Result<BTreeMap<Role, i64>, AppError> {
    let users = load_user_scopes(pool).await?;
    Ok(role_counts(&users))
}

pub async fn load_user_summary(pool: &PgPool, user_id: i64) -> Result<UserSummary, AppError> {
    let scores = load_user_scores(pool, user_id).await?;
    let total_skills = count(pool, "skills").await?;
    Ok(user_summary(user_id, &scores, total_skills))
}

pub async fn load_hr_report(pool: &PgPool) -> Result<HrReport, AppError> {
    let users = load_user_scopes(pool).await?;
    let scores = load_scores(pool).await?;
    let departments = load_departments(pool).await?;
    let total_skills = count(pool, "skills").await?;

    Ok(HrReport {
        stats: overall_stats(users.len() as i64, total_skills, &scores),
        roles: role_counts(&users),
        departments: department_summary(&departments, &users, &scores),
    })
}

pub async fn load_team_overview(pool: &PgPool, manager: &Principal) -> Result<TeamOverview, AppError> {
    let Some(department_id) = manager.department_id else {
        return Ok(team_overview(None, Vec::new(), &[]));
    };

    let members = sqlx::query_as::<_, TeamMemberRow>(
        r#"
        SELECT id, full_name, login, role, position
        FROM users
        WHERE department_id = $1 AND id <> $2
        ORDER BY full_name
        "#,
    )
    .bind(department_id)
    .bind(manager.user_id)
    .fetch_all(pool)
    .await?;

    let scores = sqlx::query_as::<_, ScorePair>(
        r#"
        SELECT a.user_id, a.skill_id, a.self_score, a.manager_score
        FROM skill_assessments a
        JOIN users u ON u.id = a.user_id
        WHERE u.department_id = $1 AND u.id <> $2
        "#,
    )
    .bind(department_id)
    .bind(manager.user_id)
    .fetch_all(pool)
    .await?;

    Ok(team_overview(Some(department_id), members, &scores))
}

pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub async fn search_by_skill(
    pool: &PgPool,
    principal: &Principal,
    skill_name: &str,
    min_score: Score,
) -> Result<SkillSearch, AppError> {
    let skill = sqlx::query_as::<_, Skill>(
        r#"
        SELECT id, name, category, description, created_at, updated_at
        FROM skills
        WHERE name ILIKE $1
        ORDER BY name, id
        LIMIT 1
        "#,
    )
    .bind(like_pattern(skill_name.trim()))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Skill not found".to_string()))?;

    let candidates = sqlx::query_as::<_, SkillMatch>(
        r#"
        SELECT
            u.id,
            u.full_name,
            u.login,
            u.role,
            u.position,
            u.department_id,
            d.name AS department,
            a.self_score,
            a.manager_score
        FROM skill_assessments a
        JOIN users u ON u.id = a.user_id
        LEFT JOIN departments d ON d.id = u.department_id
        WHERE a.skill_id = $1
        "#,
    )
    .bind(skill.id)
    .fetch_all(pool)
    .await?;

    let users = filter_skill_matches(principal, candidates, min_score);
    Ok(SkillSearch {
        total_found: users.len(),
        skill,
        min_score,
        users,
    })
}

pub async fn compare_users(
    pool: &PgPool,
    user1_id: i64,
    user2_id: i64,
) -> Result<Vec<ComparisonRow>, AppError> {
    let skills = load_skills(pool).await?;
    let first = load_user_scores(pool, user1_id).await?;
    let second = load_user_scores(pool, user2_id).await?;
    Ok(compare(&skills, &first, &second))
}

pub async fn user_skill_profile(pool: &PgPool, user_id: i64) -> Result<Vec<SkillProfileEntry>, AppError> {
    let mut entries = sqlx::query_as::<_, SkillProfileEntry>(
        r#"
        SELECT
            s.id AS skill_id,
            s.name,
            s.category,
            s.description,
            a.self_score,
            a.manager_score,
            a.assessed_at
        FROM skills s
        LEFT JOIN skill_assessments a ON a.skill_id = s.id AND a.user_id = $1
        ORDER BY s.category, s.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    for entry in &mut entries {
        entry.final_score = effective_score(entry.self_score, entry.manager_score);
    }
    Ok(entries)
}

pub async fn dashboard(pool: &PgPool, principal: &Principal) -> Result<Dashboard, AppError> {
    match principal.role {
        Role::Employee => {
            let summary = load_user_summary(pool, principal.user_id).await?;
            Ok(Dashboard {
                assessed_skills: Some(summary.assessed_skills),
                total_skills: Some(summary.total_skills),
                avg_score: Some(summary.avg_self_score.unwrap_or(0.0)),
                ..Dashboard::default()
            })
        }
        Role::Manager => {
            let team = load_team_overview(pool, principal).await?;
            Ok(Dashboard {
                team_count: Some(team.team_count),
                pending_reviews: Some(team.pending_reviews),
                ..Dashboard::default()
            })
        }
        Role::Hr | Role::Admin => Ok(Dashboard {
            total_users: Some(count(pool, "users").await?),
            total_departments: Some(count(pool, "departments").await?),
            total_skills: Some(count(pool, "skills").await?),
            ..Dashboard::default()
        }),
    }
}
