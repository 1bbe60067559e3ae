//! Mute / solo resolution
//!
//! Audibility is recomputed from the raw track flags on every graph rebuild;
//! there is no stored "effective mute".

use crate::engine::state::TrackState;

/// Whether any track in the list is soloed
pub fn any_soloed(tracks: &[TrackState]) -> bool {
    tracks.iter().any(|t| t.solo)
}

/// Audibility of one track given the solo state of the whole mixer
///
/// With any solo active only soloed tracks play, regardless of mute.
/// Otherwise every unmuted track plays.
#[inline]
pub fn is_audible(track: &TrackState, any_soloed: bool) -> bool {
    if any_soloed {
        track.solo
    } else {
        !track.muted
    }
}

/// Audibility for every track, in input order
pub fn resolve_audibility(tracks: &[TrackState]) -> Vec<bool> {
    let soloed = any_soloed(tracks);
    tracks.iter().map(|t| is_audible(t, soloed)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solo_overrides_mute_and_unsoloed() {
        let tracks = vec![
            TrackState::new("A"),
            TrackState::new("B").with_solo(true),
            TrackState::new("C").with_muted(true),
        ];
        assert_eq!(resolve_audibility(&tracks), vec![false, true, false]);
    }

    #[test]
    fn test_no_solo_uses_mute() {
        let tracks = vec![TrackState::new("A"), TrackState::new("B").with_muted(true)];
        assert_eq!(resolve_audibility(&tracks), vec![true, false]);
    }

    #[test]
    fn test_soloed_and_muted_track_plays() {
        let tracks = vec![TrackState::new("A").with_muted(true).with_solo(true)];
        assert_eq!(resolve_audibility(&tracks), vec![true]);
    }

    #[test]
    fn test_empty() {
        assert!(resolve_audibility(&[]).is_empty());
        assert!(!any_soloed(&[]));
    }
}
