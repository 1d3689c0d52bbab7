use std::collections::BTreeSet;
use std::sync::OnceLock;

use ccmd_core::Role;
use regex::{Captures, Regex};

const ZERO_WIDTH_SPACE: char = '\u{200b}';

/// Mass-mention classes a template has unlocked while rendering.
///
/// Every grant comes from a mention function call; the default denies all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionPolicy {
    pub everyone: bool,
    pub here: bool,
    pub role_ids: Vec<i64>,
    pub role_names: Vec<String>,
}

impl MentionPolicy {
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn allow_role_id(&mut self, role_id: i64) {
        if !self.role_ids.contains(&role_id) {
            self.role_ids.push(role_id);
        }
    }

    pub fn allow_role_name(&mut self, name: &str) {
        if !self.role_names.iter().any(|known| known == name) {
            self.role_names.push(name.to_string());
        }
    }

    fn allowed_role_ids(&self, roles: &[Role]) -> BTreeSet<i64> {
        let mut allowed: BTreeSet<i64> = self.role_ids.iter().copied().collect();
        allowed.extend(
            roles
                .iter()
                .filter(|role| self.role_names.iter().any(|name| *name == role.name))
                .map(|role| role.id),
        );
        allowed
    }
}

/// Breaks every mass mention in `text` that `policy` does not allow.
///
/// Role names in the policy are resolved to ids through `roles`.
pub fn sanitize_mentions(text: &str, policy: &MentionPolicy, roles: &[Role]) -> String {
    let mut out = text.to_string();
    if !policy.everyone {
        out = out.replace("@everyone", &format!("@{ZERO_WIDTH_SPACE}everyone"));
    }
    if !policy.here {
        out = out.replace("@here", &format!("@{ZERO_WIDTH_SPACE}here"));
    }

    let allowed = policy.allowed_role_ids(roles);
    role_mention_regex()
        .replace_all(&out, |captures: &Captures<'_>| {
            let allowed_id = captures[1]
                .parse::<i64>()
                .is_ok_and(|role_id| allowed.contains(&role_id));
            if allowed_id {
                captures[0].to_string()
            } else {
                format!("<@&{ZERO_WIDTH_SPACE}{}>", &captures[1])
            }
        })
        .into_owned()
}

fn role_mention_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<@&(\d+)>").expect("role mention regex"))
}
