use serde::Serialize;

/// An answer pulled out of generated text, with the expression it answers when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedAnswer {
    pub before: Option<String>,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiddleExample {
    pub riddle: String,
    pub solution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemeExample {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmojiExample {
    pub problem: String,
    pub solution: Option<String>,
}
