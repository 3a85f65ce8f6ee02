// Core data models for the mood detector

use serde::{Deserialize, Serialize};

/// Represents a single video frame with RGB data
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
}

/// Facial expression labels reported by the expression classifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    /// Label order of the expression classifier's output vector
    pub const ALL: [Expression; 7] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    /// Wire label, as sent in the mood report
    pub fn label(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Expression confidences for one face, in the classifier's enumeration order.
///
/// The order matters: it decides which label wins a tie in
/// [`crate::mood::dominant_mood`]. Adding a label that is already present
/// overwrites its score in place and keeps its original position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionScores {
    scores: Vec<(Expression, f32)>,
}

impl ExpressionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the score for `expression`, appending it if it is new
    pub fn insert(&mut self, expression: Expression, score: f32) {
        match self.scores.iter_mut().find(|(e, _)| *e == expression) {
            Some(entry) => entry.1 = score,
            None => self.scores.push((expression, score)),
        }
    }

    pub fn get(&self, expression: Expression) -> Option<f32> {
        self.scores
            .iter()
            .find(|(e, _)| *e == expression)
            .map(|(_, s)| *s)
    }

    /// Iterates in enumeration order
    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        self.scores.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Builds scores from a probability vector laid out as [`Expression::ALL`]
    pub fn from_probabilities(probabilities: &[f32]) -> Self {
        Expression::ALL
            .iter()
            .copied()
            .zip(probabilities.iter().copied())
            .collect()
    }
}

impl FromIterator<(Expression, f32)> for ExpressionScores {
    fn from_iter<I: IntoIterator<Item = (Expression, f32)>>(iter: I) -> Self {
        let mut scores = ExpressionScores::new();
        for (expression, score) in iter {
            scores.insert(expression, score);
        }
        scores
    }
}

/// Axis-aligned face box in frame pixel coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence (0.0 to 1.0)
    pub score: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Result of a single-face detection with landmarks and expressions
#[derive(Clone, Debug)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    /// 68-point face landmarks
    pub landmarks: Vec<Point>,
    pub expressions: ExpressionScores,
}

/// Outbound payload of the mood report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodReport {
    pub mood: Expression,
}

/// Response of the mood decision service
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MoodResponse {
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MoodResponse {
    /// Navigation directive, if the service sent a non-empty redirect
    pub fn navigation(&self) -> Option<NavigationDirective> {
        self.redirect
            .as_deref()
            .filter(|target| !target.is_empty())
            .map(|target| NavigationDirective(target.to_string()))
    }
}

/// Server-supplied destination the page should load next
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationDirective(pub String);

impl NavigationDirective {
    pub fn target(&self) -> &str {
        &self.0
    }
}
