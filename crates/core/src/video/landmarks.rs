//! Boundary to the face/iris landmark detector.
//!
//! The detector itself runs out of process (a face-mesh sidecar); this module
//! defines what the analysis unit needs from it and an HTTP client for it.

use std::{io::Cursor, time::Duration};

use serde::Deserialize;
use tracing::debug;

use crate::{error::LandmarkError, video::frames::Frame};

/// Normalized image coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Landmarks of the single most confident face in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn x(&self, index: usize) -> Option<f64> {
        self.points.get(index).map(|p| p.x)
    }

    #[cfg(test)]
    pub(crate) fn points_mut(&mut self) -> &mut [Point] {
        &mut self.points
    }
}

/// Detects the landmarks of at most one face per frame.
///
/// `Ok(None)` means no face was found; it is a normal outcome, not an error.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Option<FaceLandmarks>, LandmarkError>;
}

#[derive(Debug, Clone)]
pub struct LandmarkServiceConfig {
    /// Base URL of the face-mesh sidecar
    pub base_url: String,
    pub timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for LandmarkServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            timeout: Duration::from_secs(10),
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

#[derive(Debug, Deserialize)]
struct DetectedFace {
    #[serde(default)]
    score: f64,
    landmarks: Vec<Vec<f64>>,
}

impl DetectedFace {
    /// Points with fewer than two coordinates become NaN so that any gaze
    /// lookup touching them reads as undetected.
    fn into_landmarks(self) -> FaceLandmarks {
        let points = self
            .landmarks
            .into_iter()
            .map(|coords| match coords.as_slice() {
                [x, y, ..] => Point { x: *x, y: *y },
                _ => Point {
                    x: f64::NAN,
                    y: f64::NAN,
                },
            })
            .collect();
        FaceLandmarks::new(points)
    }
}

fn most_confident(faces: Vec<DetectedFace>) -> Option<DetectedFace> {
    faces.into_iter().reduce(|best, face| {
        if face.score > best.score { face } else { best }
    })
}

/// Blocking HTTP client for a face-mesh sidecar.
///
/// `POST {base_url}/landmarks` with a JPEG body; the reply is
/// `{"faces": [{"score": f64, "landmarks": [[x, y, z?], ...]}]}`.
pub struct LandmarkServiceClient {
    http: reqwest::blocking::Client,
    config: LandmarkServiceConfig,
}

impl LandmarkServiceClient {
    pub fn new(config: LandmarkServiceConfig) -> Result<Self, LandmarkError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, LandmarkError> {
        let mut buf = Cursor::new(Vec::new());
        frame.write_to(
            &mut buf,
            image::ImageOutputFormat::Jpeg(self.config.jpeg_quality),
        )?;
        Ok(buf.into_inner())
    }
}

impl LandmarkDetector for LandmarkServiceClient {
    fn detect(&self, frame: &Frame) -> Result<Option<FaceLandmarks>, LandmarkError> {
        let url = format!("{}/landmarks", self.config.base_url.trim_end_matches('/'));
        let body = self.encode(frame)?;

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "image/jpeg")
            .body(body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(LandmarkError::Service { status, body });
        }

        let parsed: DetectResponse = response.json()?;
        debug!(faces = parsed.faces.len(), "landmark service reply");
        Ok(most_confident(parsed.faces).map(DetectedFace::into_landmarks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_most_confident_face() {
        let reply: DetectResponse = serde_json::from_str(
            r#"{"faces": [
                {"score": 0.4, "landmarks": [[0.1, 0.1]]},
                {"score": 0.9, "landmarks": [[0.7, 0.2, 0.0]]}
            ]}"#,
        )
        .unwrap();
        let face = most_confident(reply.faces).unwrap().into_landmarks();
        assert_eq!(face.x(0), Some(0.7));
    }

    #[test]
    fn no_faces_means_none() {
        let reply: DetectResponse = serde_json::from_str(r#"{"faces": []}"#).unwrap();
        assert!(most_confident(reply.faces).is_none());
        let reply: DetectResponse = serde_json::from_str("{}").unwrap();
        assert!(most_confident(reply.faces).is_none());
    }

    #[test]
    fn short_points_become_nan() {
        let face = DetectedFace {
            score: 1.0,
            landmarks: vec![vec![0.3]],
        }
        .into_landmarks();
        assert!(face.x(0).unwrap().is_nan());
        assert_eq!(face.x(1), None);
    }
}
