use crate::detect::{BoundingBox, Detection};

use super::matching::{fuse_score, iou_cost, linear_assignment, Assignment, FORBIDDEN};
use super::TrackerConfig;

/// Weight of the newest displacement in the velocity estimate.
const VELOCITY_GAIN: f32 = 0.5;
/// Second-stage (low score) association threshold.
const LOW_MATCH_THRESH: f32 = 0.5;
/// Threshold for confirming tentative tracks.
const UNCONFIRMED_MATCH_THRESH: f32 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TrackState {
    Tracked,
    Lost,
}

#[derive(Clone, Debug)]
struct Track {
    /// Zero until the track is confirmed.
    id: u64,
    class_id: usize,
    /// Predicted box for the current frame.
    bbox: BoundingBox,
    /// Last measured box.
    measured: BoundingBox,
    velocity: [f32; 4],
    state: TrackState,
    confirmed: bool,
    last_frame: u64,
}

impl Track {
    fn new(detection: &Detection, frame: u64) -> Self {
        Self {
            id: 0,
            class_id: detection.class_id,
            bbox: detection.bbox,
            measured: detection.bbox,
            velocity: [0.0; 4],
            state: TrackState::Tracked,
            confirmed: false,
            last_frame: frame,
        }
    }

    /// Constant-velocity step.
    fn predict(&mut self) {
        let [dx1, dy1, dx2, dy2] = self.velocity;
        self.bbox = BoundingBox::new(
            self.bbox.x1 + dx1,
            self.bbox.y1 + dy1,
            self.bbox.x2 + dx2,
            self.bbox.y2 + dy2,
        );
    }

    fn update(&mut self, detection: &Detection, frame: u64) {
        let gap = frame.saturating_sub(self.last_frame).max(1) as f32;
        let observed = [
            (detection.bbox.x1 - self.measured.x1) / gap,
            (detection.bbox.y1 - self.measured.y1) / gap,
            (detection.bbox.x2 - self.measured.x2) / gap,
            (detection.bbox.y2 - self.measured.y2) / gap,
        ];
        for (velocity, observed) in self.velocity.iter_mut().zip(observed) {
            *velocity = (1.0 - VELOCITY_GAIN) * *velocity + VELOCITY_GAIN * observed;
        }
        self.bbox = detection.bbox;
        self.measured = detection.bbox;
        self.state = TrackState::Tracked;
        self.last_frame = frame;
    }
}

/// ByteTrack multi-object tracker.
///
/// Detections are split into high and low confidence. High ones are matched
/// against live and recently lost tracks first; leftover live tracks then get
/// a second chance against the low ones, so an object whose score dips for a
/// few frames keeps its identity. Unmatched high detections open tentative
/// tracks that are confirmed (and numbered) when matched again on the next
/// frame. Tracks unseen for longer than the track buffer are dropped.
pub struct ByteTracker {
    config: TrackerConfig,
    tracked: Vec<Track>,
    lost: Vec<Track>,
    frame: u64,
    next_id: u64,
    max_time_lost: u64,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let max_time_lost =
            ((config.frame_rate / 30.0) * config.track_buffer as f32).round().max(1.0) as u64;
        Self {
            config,
            tracked: Vec::new(),
            lost: Vec::new(),
            frame: 0,
            next_id: 0,
            max_time_lost,
        }
    }

    /// Frames processed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of confirmed tracks currently in view.
    pub fn active_tracks(&self) -> usize {
        self.tracked.iter().filter(|track| track.confirmed).count()
    }

    /// Associate this frame's detections with tracks and stamp
    /// `track_id` on every detection that belongs to a confirmed track.
    pub fn update(&mut self, detections: &mut [Detection]) {
        self.frame += 1;
        let frame = self.frame;
        for detection in detections.iter_mut() {
            detection.track_id = None;
        }

        let mut high = Vec::new();
        let mut low = Vec::new();
        for (index, detection) in detections.iter().enumerate() {
            if detection.confidence >= self.config.high_thresh {
                high.push(index);
            } else if detection.confidence >= self.config.low_thresh {
                low.push(index);
            }
        }

        let (confirmed, unconfirmed): (Vec<Track>, Vec<Track>) =
            self.tracked.drain(..).partition(|track| track.confirmed);
        let mut pool = confirmed;
        pool.append(&mut self.lost);
        for track in pool.iter_mut() {
            track.predict();
        }

        let mut next_tracked = Vec::new();
        let mut next_lost = Vec::new();

        // First association: every known track against high-score detections.
        let first = associate(&pool, detections, &high, self.config.match_thresh, true);
        let mut pool: Vec<Option<Track>> = pool.into_iter().map(Some).collect();
        for (t, d) in first.matches {
            if let Some(mut track) = pool[t].take() {
                let index = high[d];
                track.update(&detections[index], frame);
                detections[index].track_id = Some(track.id);
                next_tracked.push(track);
            }
        }
        let remaining_high: Vec<usize> = first
            .unmatched_detections
            .iter()
            .map(|&d| high[d])
            .collect();

        // Second association: live tracks left over against low-score detections.
        let mut retry = Vec::new();
        for t in first.unmatched_tracks {
            if let Some(track) = pool[t].take() {
                match track.state {
                    TrackState::Tracked => retry.push(track),
                    TrackState::Lost => next_lost.push(track),
                }
            }
        }
        let second = associate(&retry, detections, &low, LOW_MATCH_THRESH, false);
        let mut retry: Vec<Option<Track>> = retry.into_iter().map(Some).collect();
        for (t, d) in second.matches {
            if let Some(mut track) = retry[t].take() {
                let index = low[d];
                track.update(&detections[index], frame);
                detections[index].track_id = Some(track.id);
                next_tracked.push(track);
            }
        }
        for mut track in retry.into_iter().flatten() {
            track.state = TrackState::Lost;
            next_lost.push(track);
        }

        // Tentative tracks from the previous frame are confirmed or dropped.
        let third = associate(
            &unconfirmed,
            detections,
            &remaining_high,
            UNCONFIRMED_MATCH_THRESH,
            true,
        );
        let mut unconfirmed: Vec<Option<Track>> = unconfirmed.into_iter().map(Some).collect();
        for (t, d) in third.matches {
            if let Some(mut track) = unconfirmed[t].take() {
                let index = remaining_high[d];
                track.update(&detections[index], frame);
                self.confirm(&mut track);
                detections[index].track_id = Some(track.id);
                next_tracked.push(track);
            }
        }

        // New tracks. On the very first frame they are confirmed at once.
        for d in third.unmatched_detections {
            let index = remaining_high[d];
            if detections[index].confidence < self.config.new_track_thresh {
                continue;
            }
            let mut track = Track::new(&detections[index], frame);
            if frame == 1 {
                self.confirm(&mut track);
                detections[index].track_id = Some(track.id);
            }
            next_tracked.push(track);
        }

        let max_time_lost = self.max_time_lost;
        next_lost.retain(|track| frame - track.last_frame <= max_time_lost);
        self.tracked = next_tracked;
        self.lost = next_lost;
    }

    fn confirm(&mut self, track: &mut Track) {
        if !track.confirmed {
            self.next_id += 1;
            track.id = self.next_id;
            track.confirmed = true;
        }
    }
}

fn associate(
    tracks: &[Track],
    detections: &[Detection],
    candidates: &[usize],
    threshold: f32,
    fuse: bool,
) -> Assignment {
    let track_boxes: Vec<BoundingBox> = tracks.iter().map(|track| track.bbox).collect();
    let detection_boxes: Vec<BoundingBox> =
        candidates.iter().map(|&index| detections[index].bbox).collect();
    let mut cost = iou_cost(&track_boxes, &detection_boxes);
    if fuse {
        let scores: Vec<f32> = candidates
            .iter()
            .map(|&index| detections[index].confidence)
            .collect();
        fuse_score(&mut cost, &scores);
    }
    for (i, track) in tracks.iter().enumerate() {
        for (j, &index) in candidates.iter().enumerate() {
            if detections[index].class_id != track.class_id {
                cost[[i, j]] = FORBIDDEN;
            }
        }
    }
    linear_assignment(&cost, threshold)
}
