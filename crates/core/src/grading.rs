//! Answer checking for submitted attempts.

/// How a problem's stored answer is compared against a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    /// The stored answer is one of the offered options.
    Choice,
    /// The stored answer lists accepted responses separated by `|`, `,` or `;`.
    Text,
}

/// Lowercases, drops everything except ASCII letters, digits and whitespace,
/// then collapses whitespace runs.
pub fn normalize_answer(answer: &str) -> String {
    let kept: String = answer
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_correct(kind: AnswerKind, correct_answer: &str, user_answer: &str) -> bool {
    match kind {
        AnswerKind::Choice => {
            user_answer.trim().to_lowercase() == correct_answer.trim().to_lowercase()
        }
        AnswerKind::Text => {
            let submitted = normalize_answer(user_answer);
            correct_answer
                .split(['|', ',', ';'])
                .map(str::trim)
                .filter(|candidate| !candidate.is_empty())
                .map(normalize_answer)
                .any(|accepted| accepted == submitted)
        }
    }
}
