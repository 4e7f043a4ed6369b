use serde::{Serialize, Serializer};

use crate::grading::FieldError;

pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 5;

/// Affective and psychomotor traits rated on every report card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BehaviouralSkill {
    Punctuality,
    Neatness,
    Attentiveness,
    SocialDevelopment,
    Assignment,
    ClassParticipation,
    Perseverance,
    Responsibility,
    Politeness,
    Honesty,
    SportAndGames,
    Industry,
    ClubParticipation,
    Psychomotor,
}

impl BehaviouralSkill {
    /// Report-card order.
    pub const ALL: [BehaviouralSkill; 14] = [
        Self::Punctuality,
        Self::Neatness,
        Self::Attentiveness,
        Self::SocialDevelopment,
        Self::Assignment,
        Self::ClassParticipation,
        Self::Perseverance,
        Self::Responsibility,
        Self::Politeness,
        Self::Honesty,
        Self::SportAndGames,
        Self::Industry,
        Self::ClubParticipation,
        Self::Psychomotor,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Punctuality => "Punctuality",
            Self::Neatness => "Neatness",
            Self::Attentiveness => "Attentiveness",
            Self::SocialDevelopment => "Social Development",
            Self::Assignment => "Assignment",
            Self::ClassParticipation => "Class Participation",
            Self::Perseverance => "Perseverance",
            Self::Responsibility => "Responsibility",
            Self::Politeness => "Politeness",
            Self::Honesty => "Honesty",
            Self::SportAndGames => "Sport & Games",
            Self::Industry => "Industry",
            Self::ClubParticipation => "Club Participation",
            Self::Psychomotor => "Psychomotor",
        }
    }

    /// Stable storage key.
    pub fn key(self) -> &'static str {
        match self {
            Self::Punctuality => "punctuality",
            Self::Neatness => "neatness",
            Self::Attentiveness => "attentiveness",
            Self::SocialDevelopment => "social_development",
            Self::Assignment => "assignment",
            Self::ClassParticipation => "class_participation",
            Self::Perseverance => "perseverance",
            Self::Responsibility => "responsibility",
            Self::Politeness => "politeness",
            Self::Honesty => "honesty",
            Self::SportAndGames => "sport_and_games",
            Self::Industry => "industry",
            Self::ClubParticipation => "club_participation",
            Self::Psychomotor => "psychomotor",
        }
    }

    /// Accepts either the storage key or the printed label, ignoring case.
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.key().eq_ignore_ascii_case(t) || s.label().eq_ignore_ascii_case(t))
    }

    pub fn position(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(Self::ALL.len())
    }
}

impl Serialize for BehaviouralSkill {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

pub fn check_rating(skill: BehaviouralSkill, rating: i64) -> Option<FieldError> {
    if (RATING_MIN..=RATING_MAX).contains(&rating) {
        return None;
    }
    Some(FieldError::new(
        format!("skills.{}", skill.key()),
        format!("rating must be between {} and {}", RATING_MIN, RATING_MAX),
    ))
}

/// Parses a `{ "<skill>": <rating|null>, ... }` batch. Null entries are
/// skipped so they leave stored ratings alone; unknown names and bad values
/// are reported together.
pub fn parse_rating_batch(
    raw: Option<&serde_json::Value>,
) -> Result<Vec<(BehaviouralSkill, i64)>, Vec<FieldError>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let Some(obj) = raw.as_object() else {
        return Err(vec![FieldError::new("skills", "must be an object")]);
    };

    let mut out: Vec<(BehaviouralSkill, i64)> = Vec::new();
    let mut errors = Vec::new();
    for (name, value) in obj {
        let Some(skill) = BehaviouralSkill::parse(name) else {
            errors.push(FieldError::new(
                format!("skills.{}", name),
                "unknown behavioural skill",
            ));
            continue;
        };
        if value.is_null() {
            continue;
        }
        let Some(rating) = value.as_i64() else {
            errors.push(FieldError::new(
                format!("skills.{}", skill.key()),
                "rating must be an integer",
            ));
            continue;
        };
        if let Some(e) = check_rating(skill, rating) {
            errors.push(e);
            continue;
        }
        match out.iter_mut().find(|(s, _)| *s == skill) {
            Some(existing) => existing.1 = rating,
            None => out.push((skill, rating)),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    out.sort_by_key(|(s, _)| s.position());
    Ok(out)
}
