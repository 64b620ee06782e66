//! The cached user-identity record.

use serde::{Deserialize, Serialize};

/// User profile as returned by the profile endpoint.
///
/// Mirrors the platform's user record; fields the server omits fall back to
/// their defaults so a partial response still deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub study_goal: String,
}

impl Profile {
    /// Name shown to the user: the username, falling back to "first last".
    pub fn display_name(&self) -> String {
        if !self.username.is_empty() {
            return self.username.clone();
        }
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Apply a local partial update, leaving unnamed fields untouched.
    pub fn merged(&self, update: &ProfileUpdate) -> Profile {
        let mut merged = self.clone();
        if let Some(ref first_name) = update.first_name {
            merged.first_name = first_name.clone();
        }
        if let Some(ref last_name) = update.last_name {
            merged.last_name = last_name.clone();
        }
        if let Some(dark_mode) = update.dark_mode {
            merged.dark_mode = dark_mode;
        }
        if let Some(ref study_goal) = update.study_goal {
            merged.study_goal = study_goal.clone();
        }
        merged
    }
}

/// Local-only partial profile edit. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dark_mode: Option<bool>,
    pub study_goal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Profile {
        Profile {
            username: "mara".to_string(),
            email: "mara@example.com".to_string(),
            first_name: "Mara".to_string(),
            last_name: "Okafor".to_string(),
            dark_mode: false,
            study_goal: "Finish calculus".to_string(),
        }
    }

    #[test]
    fn merged_changes_only_named_fields() {
        let profile = sample();
        let update = ProfileUpdate {
            study_goal: Some("Pass finals".to_string()),
            ..Default::default()
        };

        let merged = profile.merged(&update);
        assert_eq!(merged.study_goal, "Pass finals");
        assert_eq!(merged.username, profile.username);
        assert_eq!(merged.email, profile.email);
        assert_eq!(merged.first_name, profile.first_name);
        assert_eq!(merged.dark_mode, profile.dark_mode);
    }

    #[test]
    fn empty_update_is_identity() {
        let profile = sample();
        assert_eq!(profile.merged(&ProfileUpdate::default()), profile);
    }

    #[test]
    fn display_name_prefers_username() {
        assert_eq!(sample().display_name(), "mara");

        let mut anonymous = sample();
        anonymous.username.clear();
        assert_eq!(anonymous.display_name(), "Mara Okafor");
    }

    #[test]
    fn partial_response_deserializes_with_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"username": "mara"}"#)
            .expect("partial profile should deserialize");
        assert_eq!(profile.username, "mara");
        assert!(profile.email.is_empty());
        assert!(!profile.dark_mode);
    }
}
