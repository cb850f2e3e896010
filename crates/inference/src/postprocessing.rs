use crate::backend::{ClassNames, DetectParams, RawDetection};
use crate::preprocessing::Letterbox;
use common::span;
use ndarray::ArrayViewD;

/// Upper bound on boxes entering NMS, matching the Ultralytics reference pipeline.
const MAX_NMS_CANDIDATES: usize = 30_000;

pub struct PostProcessor {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&DetectParams> for PostProcessor {
    fn from(params: &DetectParams) -> Self {
        Self {
            conf_threshold: params.conf_threshold,
            iou_threshold: params.iou_threshold,
            max_detections: params.max_detections,
        }
    }
}

impl PostProcessor {
    /// Decode a YOLOv8 head, suppress overlaps and map boxes onto the source image.
    ///
    /// `output` is `[1, 4 + num_classes, anchors]` (the Ultralytics export layout)
    /// or its transpose `[1, anchors, 4 + num_classes]`. Each anchor carries a
    /// `cx, cy, w, h` box in model input pixels followed by per-class scores.
    #[tracing::instrument(skip_all)]
    pub fn parse_detections(
        &self,
        output: &ArrayViewD<f32>,
        letterbox: &Letterbox,
    ) -> anyhow::Result<Vec<RawDetection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 {
            anyhow::bail!("Expected YOLO output of shape [1, C, N], got {:?}", shape);
        }

        // Features are the short axis: 84 channels against 8400 anchors for COCO.
        let channels_first = shape[1] <= shape[2] || shape[2] <= 4;
        let (num_features, num_anchors) = if channels_first {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if num_features <= 4 {
            anyhow::bail!(
                "YOLO output has {} features per anchor, need 4 box values plus class scores",
                num_features
            );
        }

        let feature = |anchor: usize, f: usize| -> f32 {
            if channels_first {
                output[[0, f, anchor]]
            } else {
                output[[0, anchor, f]]
            }
        };

        let mut candidates = {
            let _s = span!("decode_candidates");
            let mut candidates = Vec::new();
            for anchor in 0..num_anchors {
                let mut confidence = f32::NEG_INFINITY;
                let mut class_id = 0usize;
                for f in 4..num_features {
                    let score = feature(anchor, f);
                    if score > confidence {
                        confidence = score;
                        class_id = f - 4;
                    }
                }

                if confidence <= self.conf_threshold {
                    continue;
                }

                let (x1, y1, x2, y2) = cxcywh_to_xyxy(
                    feature(anchor, 0),
                    feature(anchor, 1),
                    feature(anchor, 2),
                    feature(anchor, 3),
                );

                candidates.push(RawDetection {
                    x1,
                    y1,
                    x2,
                    y2,
                    confidence,
                    class_id: class_id as u32,
                });
            }
            candidates
        };

        tracing::trace!(candidates = candidates.len(), "Candidates above threshold");

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(MAX_NMS_CANDIDATES);

        let kept = non_max_suppression(&candidates, self.iou_threshold, self.max_detections);

        Ok(kept
            .into_iter()
            .map(|det| {
                let (x1, y1) = letterbox.to_source(det.x1, det.y1);
                let (x2, y2) = letterbox.to_source(det.x2, det.y2);
                RawDetection {
                    x1,
                    y1,
                    x2,
                    y2,
                    ..det
                }
            })
            .collect())
    }
}

/// Greedy class-aware NMS over candidates sorted by descending confidence.
///
/// A box is dropped when an already kept box of the same class overlaps it
/// with IoU strictly greater than `iou_threshold`. Output keeps input order.
pub fn non_max_suppression(
    sorted: &[RawDetection],
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    let _s = span!("non_max_suppression");

    let mut kept: Vec<RawDetection> = Vec::with_capacity(max_detections.min(sorted.len()));
    for candidate in sorted {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, candidate) > iou_threshold);
        if !suppressed {
            kept.push(*candidate);
        }
    }
    kept
}

/// Intersection over union of two corner-format boxes.
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = ix * iy;

    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 { 0.0 } else { intersection / union }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}

/// Parse the `names` metadata an Ultralytics ONNX export carries, e.g.
/// `{0: 'person', 1: 'bicycle', 9: "traffic light"}`.
///
/// Returns `None` when the value is not a dict literal of `int: str` pairs.
pub fn parse_class_names(raw: &str) -> Option<ClassNames> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;

    let mut names = ClassNames::new();
    for entry in split_top_level(body) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once(':')?;
        let id = key.trim().parse::<u32>().ok()?;
        names.insert(id, unquote(value.trim())?.to_string());
    }

    (!names.is_empty()).then_some(names)
}

/// Split on commas that are not inside a quoted string.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn unquote(value: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|q| {
        value
            .strip_prefix(q)
            .and_then(|v| v.strip_suffix(q))
    })
}

/// Parse the `imgsz` metadata (`[height, width]`) into `(width, height)`.
pub fn parse_input_size(raw: &str) -> Option<(u32, u32)> {
    let body = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    let dims: Vec<u32> = body
        .split(',')
        .map(|d| d.trim().parse().ok())
        .collect::<Option<_>>()?;
    match dims.as_slice() {
        [h, w] if *h > 0 && *w > 0 => Some((*w, *h)),
        [s] if *s > 0 => Some((*s, *s)),
        _ => None,
    }
}

/// Width and height of a static NCHW input shape. Dynamic axes are reported
/// as non-positive values and yield `None`.
pub fn static_input_size(dims: &[i64]) -> Option<(u32, u32)> {
    let [_, _, h, w] = dims else {
        return None;
    };
    let h = u32::try_from(*h).ok().filter(|h| *h > 0)?;
    let w = u32::try_from(*w).ok().filter(|w| *w > 0)?;
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn identity_letterbox(size: u32) -> Letterbox {
        Letterbox {
            orig_width: size,
            orig_height: size,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    fn postprocessor(conf: f32, iou: f32, max: usize) -> PostProcessor {
        PostProcessor {
            conf_threshold: conf,
            iou_threshold: iou,
            max_detections: max,
        }
    }

    /// Build a channels-first `[1, 4 + num_classes, n]` head from
    /// `(cx, cy, w, h, class, score)` anchors; other class scores are 0.
    fn yolo_head(anchors: &[(f32, f32, f32, f32, usize, f32)], num_classes: usize) -> Array<f32, IxDyn> {
        let n = anchors.len();
        let features = 4 + num_classes;
        let mut data = vec![0.0f32; features * n];
        for (i, &(cx, cy, w, h, class, score)) in anchors.iter().enumerate() {
            data[i] = cx;
            data[n + i] = cy;
            data[2 * n + i] = w;
            data[3 * n + i] = h;
            data[(4 + class) * n + i] = score;
        }
        Array::from_shape_vec(IxDyn(&[1, features, n]), data).unwrap()
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    #[test]
    fn test_cxcywh_to_xyxy() {
        let (x1, y1, x2, y2) = cxcywh_to_xyxy(50.0, 50.0, 40.0, 20.0);
        assert_eq!((x1, y1, x2, y2), (30.0, 40.0, 70.0, 60.0));
    }

    #[test]
    fn test_iou() {
        let a = det(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = det(5.0, 0.0, 15.0, 10.0, 0.8, 0);
        let c = det(20.0, 20.0, 30.0, 30.0, 0.8, 0);

        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(iou(&a, &c), 0.0);
        assert_eq!(iou(&det(1.0, 1.0, 1.0, 1.0, 0.5, 0), &det(1.0, 1.0, 1.0, 1.0, 0.5, 0)), 0.0);
    }

    #[test]
    fn test_confidence_threshold_is_strict() {
        let head = yolo_head(
            &[
                (50.0, 50.0, 10.0, 10.0, 0, 0.20),
                (150.0, 150.0, 10.0, 10.0, 1, 0.25),
                (250.0, 250.0, 10.0, 10.0, 2, 0.26),
            ],
            3,
        );

        let detections = postprocessor(0.25, 0.45, 300)
            .parse_detections(&head.view(), &identity_letterbox(640))
            .unwrap();

        assert_eq!(detections.len(), 1, "scores at or below threshold are dropped");
        assert_eq!(detections[0].class_id, 2);
    }

    #[test]
    fn test_class_argmax_and_sorted_output() {
        let mut head = yolo_head(
            &[
                (100.0, 100.0, 20.0, 20.0, 0, 0.4),
                (300.0, 300.0, 20.0, 20.0, 5, 0.9),
            ],
            80,
        );
        // Anchor 0 also scores class 17 higher than class 0
        head[[0, 4 + 17, 0]] = 0.6;

        let detections = postprocessor(0.25, 0.45, 300)
            .parse_detections(&head.view(), &identity_letterbox(640))
            .unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 5);
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(detections[1].class_id, 17);
        assert!((detections[1].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap_only() {
        let head = yolo_head(
            &[
                (100.0, 100.0, 50.0, 50.0, 0, 0.9),
                (102.0, 102.0, 50.0, 50.0, 0, 0.8), // same class, heavy overlap
                (102.0, 102.0, 50.0, 50.0, 1, 0.7), // other class, kept
                (400.0, 400.0, 50.0, 50.0, 0, 0.6), // same class, disjoint
            ],
            2,
        );

        let detections = postprocessor(0.25, 0.45, 300)
            .parse_detections(&head.view(), &identity_letterbox(640))
            .unwrap();

        let summary: Vec<(u32, f32)> = detections
            .iter()
            .map(|d| (d.class_id, d.confidence))
            .collect();
        assert_eq!(summary, vec![(0, 0.9), (1, 0.7), (0, 0.6)]);
    }

    #[test]
    fn test_max_detections_caps_output() {
        let anchors: Vec<_> = (0..10)
            .map(|i| (i as f32 * 60.0 + 20.0, 20.0, 10.0, 10.0, 0, 0.5 + i as f32 * 0.01))
            .collect();
        let head = yolo_head(&anchors, 1);

        let detections = postprocessor(0.25, 0.45, 3)
            .parse_detections(&head.view(), &identity_letterbox(640))
            .unwrap();

        assert_eq!(detections.len(), 3);
        assert!(detections[0].confidence > detections[2].confidence);
    }

    #[test]
    fn test_boxes_mapped_back_through_letterbox() {
        // 800x600 source letterboxed into 640x640: scale 0.8, offset_y 80
        let letterbox = Letterbox {
            orig_width: 800,
            orig_height: 600,
            scale: 0.8,
            offset_x: 0.0,
            offset_y: 80.0,
        };
        let head = yolo_head(
            &[
                (320.0, 320.0, 160.0, 80.0, 0, 0.9),
                (10.0, 90.0, 40.0, 40.0, 1, 0.9), // spills into the padding
            ],
            2,
        );

        let detections = postprocessor(0.25, 0.45, 300)
            .parse_detections(&head.view(), &letterbox)
            .unwrap();

        let d = &detections[0];
        assert!((d.x1 - 300.0).abs() < 1e-3, "x1 = {}", d.x1);
        assert!((d.y1 - 250.0).abs() < 1e-3, "y1 = {}", d.y1);
        assert!((d.x2 - 500.0).abs() < 1e-3, "x2 = {}", d.x2);
        assert!((d.y2 - 350.0).abs() < 1e-3, "y2 = {}", d.y2);

        let clipped = &detections[1];
        assert_eq!(clipped.x1, 0.0);
        assert_eq!(clipped.y1, 0.0);
    }

    #[test]
    fn test_transposed_layout_is_accepted() {
        // [1, anchors, features] with 8 anchors of 6 features; only anchor 0 scores.
        let mut data = vec![0.0f32; 8 * 6];
        data[..6].copy_from_slice(&[100.0, 100.0, 20.0, 20.0, 0.0, 0.8]);
        let head = Array::from_shape_vec(IxDyn(&[1, 8, 6]), data).unwrap();

        let detections = postprocessor(0.25, 0.45, 300)
            .parse_detections(&head.view(), &identity_letterbox(640))
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].x1, 90.0);
        assert_eq!(detections[0].y2, 110.0);
    }

    #[test]
    fn test_empty_and_malformed_outputs() {
        let empty = Array::<f32, _>::zeros(IxDyn(&[1, 84, 0]));
        let detections = postprocessor(0.25, 0.45, 300)
            .parse_detections(&empty.view(), &identity_letterbox(640))
            .unwrap();
        assert!(detections.is_empty());

        let flat = Array::<f32, _>::zeros(IxDyn(&[84, 8400]));
        assert!(
            postprocessor(0.25, 0.45, 300)
                .parse_detections(&flat.view(), &identity_letterbox(640))
                .is_err()
        );

        let boxes_only = Array::<f32, _>::zeros(IxDyn(&[1, 4, 100]));
        assert!(
            postprocessor(0.25, 0.45, 300)
                .parse_detections(&boxes_only.view(), &identity_letterbox(640))
                .is_err()
        );
    }

    #[test]
    fn test_parse_class_names() {
        let names =
            parse_class_names("{0: 'person', 1: 'bicycle', 9: \"traffic light\", 10: 'a, b'}")
                .unwrap();
        assert_eq!(names.len(), 4);
        assert_eq!(names[&0], "person");
        assert_eq!(names[&9], "traffic light");
        assert_eq!(names[&10], "a, b");

        assert!(parse_class_names("{}").is_none());
        assert!(parse_class_names("person, bicycle").is_none());
        assert!(parse_class_names("{zero: 'person'}").is_none());
    }

    #[test]
    fn test_parse_input_size() {
        assert_eq!(parse_input_size("[640, 640]"), Some((640, 640)));
        assert_eq!(parse_input_size("[480, 640]"), Some((640, 480)));
        assert_eq!(parse_input_size("[320]"), Some((320, 320)));
        assert_eq!(parse_input_size("640"), None);
        assert_eq!(parse_input_size("[0, 640]"), None);
    }

    #[test]
    fn test_static_input_size() {
        assert_eq!(static_input_size(&[1, 3, 320, 320]), Some((320, 320)));
        assert_eq!(static_input_size(&[1, 3, 384, 640]), Some((640, 384)));
        assert_eq!(static_input_size(&[-1, 3, 480, 640]), Some((640, 480)));
        assert_eq!(static_input_size(&[1, 3, -1, -1]), None);
        assert_eq!(static_input_size(&[1, 3, 0, 640]), None);
        assert_eq!(static_input_size(&[1, 3, 640]), None);
    }
}
