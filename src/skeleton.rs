use crate::render::RenderSink;

/// Keypoints below this confidence are not drawn.
pub const MIN_KEYPOINT_SCORE: f32 = 0.3;

/// Limb connections of the stick topology, by keypoint name.
pub const SKELETON_EDGES: [(&str, &str); 12] = [
    ("left_shoulder", "right_shoulder"),
    ("left_shoulder", "left_elbow"),
    ("left_elbow", "left_wrist"),
    ("right_shoulder", "right_elbow"),
    ("right_elbow", "right_wrist"),
    ("left_shoulder", "left_hip"),
    ("right_shoulder", "right_hip"),
    ("left_hip", "right_hip"),
    ("left_hip", "left_knee"),
    ("left_knee", "left_ankle"),
    ("right_hip", "right_knee"),
    ("right_knee", "right_ankle"),
];

/// Named body keypoint in frame coordinates with detection confidence.
#[derive(Debug, Clone)]
pub struct Keypoint {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub keypoints: Vec<Keypoint>,
}

impl Skeleton {
    pub fn keypoint(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.name == name)
    }
}

/// Draws keypoint dots and limb lines for every confident keypoint.
pub fn draw_skeleton(sink: &mut dyn RenderSink, skeleton: &Skeleton) {
    for kp in &skeleton.keypoints {
        if kp.score < MIN_KEYPOINT_SCORE {
            continue;
        }
        sink.draw_circle(kp.x, kp.y, 4.0);
    }
    for (a, b) in SKELETON_EDGES {
        let (Some(pa), Some(pb)) = (skeleton.keypoint(a), skeleton.keypoint(b)) else {
            continue;
        };
        if pa.score < MIN_KEYPOINT_SCORE || pb.score < MIN_KEYPOINT_SCORE {
            continue;
        }
        sink.draw_line(pa.x, pa.y, pb.x, pb.y);
    }
}

/// Procedurally animated stick figure for demo mode: head circle,
/// torso, arms and legs swaying around a drifting center.
pub fn draw_demo_figure(sink: &mut dyn RenderSink, width: u32, height: u32, now_secs: f64) {
    let t = now_secs / 0.6;
    let w = width as f32;
    let h = height as f32;
    let cx = w * 0.5 + (t.sin() as f32) * w * 0.2;
    let cy = h * 0.45 + (t.cos() as f32) * h * 0.1;

    // Head
    sink.draw_circle(cx, cy - 40.0, 14.0);
    // Torso
    sink.draw_line(cx, cy - 26.0, cx, cy + 26.0);
    // Arms
    sink.draw_line(cx, cy - 10.0, cx - 25.0, cy + 5.0);
    sink.draw_line(cx, cy - 10.0, cx + 25.0, cy + 5.0);
    // Legs
    sink.draw_line(cx, cy + 26.0, cx - 18.0, cy + 60.0);
    sink.draw_line(cx, cy + 26.0, cx + 18.0, cy + 60.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingSink;

    fn full_skeleton(score: f32) -> Skeleton {
        let names: Vec<&str> = SKELETON_EDGES
            .iter()
            .flat_map(|(a, b)| [*a, *b])
            .collect();
        let mut keypoints: Vec<Keypoint> = Vec::new();
        for name in names {
            if keypoints.iter().any(|k: &Keypoint| k.name == name) {
                continue;
            }
            keypoints.push(Keypoint {
                name: name.to_string(),
                x: 10.0,
                y: 20.0,
                score,
            });
        }
        Skeleton { keypoints }
    }

    #[test]
    fn confident_skeleton_draws_all_edges() {
        let mut sink = RecordingSink::new();
        let skeleton = full_skeleton(0.9);
        draw_skeleton(&mut sink, &skeleton);
        assert_eq!(sink.lines.len(), SKELETON_EDGES.len());
        assert_eq!(sink.circles.len(), skeleton.keypoints.len());
    }

    #[test]
    fn low_confidence_keypoints_are_skipped() {
        let mut sink = RecordingSink::new();
        draw_skeleton(&mut sink, &full_skeleton(0.1));
        assert!(sink.lines.is_empty());
        assert!(sink.circles.is_empty());
    }

    #[test]
    fn demo_figure_is_deterministic_per_timestamp() {
        let mut a = RecordingSink::new();
        let mut b = RecordingSink::new();
        draw_demo_figure(&mut a, 640, 480, 1.5);
        draw_demo_figure(&mut b, 640, 480, 1.5);
        assert_eq!(a.circles, b.circles);
        assert_eq!(a.lines, b.lines);
        // Head + five limb segments.
        assert_eq!(a.circles.len(), 1);
        assert_eq!(a.lines.len(), 5);
    }
}
