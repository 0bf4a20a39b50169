use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::users::repo_types::NewUser;

/// A single constraint a candidate record failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: &str, code: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Every violated rule on the candidate, sorted by field then code.
///
/// `plain_password` is the caller's input before hashing: a hash is never
/// empty, so the "password required" rule has to look at the plaintext.
pub fn check_candidate(candidate: &NewUser, plain_password: &str) -> Vec<Violation> {
    let mut violations = match candidate.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => flatten(&errors),
    };

    if plain_password.is_empty() && !violations.iter().any(|v| v.field == "password") {
        violations.push(Violation::new(
            "password",
            "length",
            "password must not be empty",
        ));
    }

    violations.sort_by(|a, b| (&a.field, &a.code).cmp(&(&b.field, &b.code)));
    violations
}

fn flatten(errors: &ValidationErrors) -> Vec<Violation> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| Violation {
                field: field.clone(),
                code: e.code.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            birthdate: None,
            password: "$argon2id$v=19$stub".into(),
        }
    }

    #[test]
    fn valid_candidate_has_no_violations() {
        assert!(check_candidate(&candidate("Ada", "ada@example.com"), "pw").is_empty());
    }

    #[test]
    fn reports_every_violated_rule() {
        let violations = check_candidate(&candidate("", "not-an-email"), "");
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "name", "password"]);
        assert_eq!(violations[0].code, "email");
        assert_eq!(violations[1].code, "length");
    }

    #[test]
    fn overlong_birthdate_is_rejected() {
        let mut c = candidate("Ada", "ada@example.com");
        c.birthdate = Some("9".repeat(65));
        let violations = check_candidate(&c, "pw");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "birthdate");
    }
}
