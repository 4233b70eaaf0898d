//! Rendering of a completed questionnaire into its output line

use crate::catalog::TestDefinition;
use crate::session::Answers;

/// Render `tag<del>q1:a1<del>q2:a2...` in the test's question order.
///
/// Every question produces a segment; unanswered ones render with an empty
/// answer, so the output always has `questions + 1` segments.
pub fn render(test: &TestDefinition, answers: &Answers) -> String {
    let mut segments = Vec::with_capacity(test.questions.len() + 1);
    segments.push(test.format.tag.clone());
    segments.extend(
        test.questions
            .iter()
            .map(|q| format!("{q}:{}", answers.get(q).unwrap_or_default())),
    );
    segments.join(&test.format.delimiter)
}
