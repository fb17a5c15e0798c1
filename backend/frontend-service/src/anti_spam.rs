//! Human check required before the Frontend mails anyone

use rand::Rng;

pub struct Challenge {
    pub id: i32,
    pub question: &'static str,
    answers: &'static [&'static str],
}

pub static CHALLENGES: [Challenge; 6] = [
    Challenge {
        id: 0,
        question: "What color is the sky?",
        answers: &["blue"],
    },
    Challenge {
        id: 1,
        question: "What is 2 + 2?",
        answers: &["4", "four"],
    },
    Challenge {
        id: 2,
        question: "How many days are in a week?",
        answers: &["7", "seven"],
    },
    Challenge {
        id: 3,
        question: "What animal says meow?",
        answers: &["cat", "cats"],
    },
    Challenge {
        id: 4,
        question: "What do you use to write?",
        answers: &["pen"],
    },
    Challenge {
        id: 5,
        question: "How many legs does a dog have?",
        answers: &["4", "four"],
    },
];

/// Missing `question_id` means question 0
pub fn is_valid_answer(question_id: Option<i32>, answer: &str) -> bool {
    let id = question_id.unwrap_or(0);
    let Some(challenge) = CHALLENGES.iter().find(|c| c.id == id) else {
        return false;
    };

    let answer = answer.trim().to_lowercase();
    challenge.answers.iter().any(|accepted| *accepted == answer)
}

pub fn random_challenge() -> &'static Challenge {
    &CHALLENGES[rand::thread_rng().gen_range(0..CHALLENGES.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_are_case_and_space_insensitive() {
        assert!(is_valid_answer(Some(0), "  Blue "));
        assert!(is_valid_answer(Some(1), "FOUR"));
        assert!(is_valid_answer(Some(2), "7"));
        assert!(is_valid_answer(Some(3), "cats"));
        assert!(is_valid_answer(Some(4), "pen"));
        assert!(is_valid_answer(Some(5), "4"));
    }

    #[test]
    fn test_default_question_is_zero() {
        assert!(is_valid_answer(None, "blue"));
        assert!(!is_valid_answer(None, "four"));
    }

    #[test]
    fn test_unknown_question_never_matches() {
        assert!(!is_valid_answer(Some(6), "blue"));
        assert!(!is_valid_answer(Some(-1), "blue"));
    }

    #[test]
    fn test_wrong_answer() {
        assert!(!is_valid_answer(Some(4), "pencil"));
        assert!(!is_valid_answer(Some(0), ""));
    }
}
