use std::collections::HashSet;

/// A reply is due when the message is neither in the target language nor
/// in one of the languages we were told to leave alone.
pub fn should_reply(detected: &str, target: &str, skip: &HashSet<String>) -> bool {
    detected != target && !skip.contains(detected)
}

/// Target and skip list, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct ReplyPolicy {
    target: String,
    skip: HashSet<String>,
}

impl ReplyPolicy {
    pub fn new(target: impl Into<String>, skip: impl IntoIterator<Item = String>) -> Self {
        Self {
            target: target.into(),
            skip: skip.into_iter().collect(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn should_reply(&self, detected: &str) -> bool {
        should_reply(detected, &self.target, &self.skip)
    }
}
