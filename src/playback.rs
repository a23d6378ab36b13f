use anyhow::Result;

/// The single shared playback binding. Exactly one implementation instance
/// exists per session and only the [`Controller`] touches it; everything
/// else observes state through the controller's published flags.
pub trait MediaElement: Send {
    fn load(&mut self, url: &str) -> Result<()>;
    fn play(&mut self) -> Result<PlayOutcome>;
    fn pause(&mut self) -> Result<()>;
    fn set_muted(&mut self, muted: bool) -> Result<()>;
    /// True once the media has signalled natural completion.
    fn poll_ended(&mut self) -> Result<bool>;
    fn unload(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    /// Playback start was refused (autoplay policy). Not an error.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Ended,
}

/// Owns the exclusive media binding and the playback state machine:
/// `Idle -> Loading -> Playing <-> Paused -> Ended -> Loading(next)`.
/// Switching entries always tears the old binding down through `Idle` first.
pub struct Controller {
    element: Box<dyn MediaElement>,
    state: PlaybackState,
    muted: bool,
    autoplay: bool,
    start_muted: bool,
    active_id: Option<String>,
}

impl Controller {
    pub fn new(element: Box<dyn MediaElement>, autoplay: bool, start_muted: bool) -> Self {
        Self {
            element,
            state: PlaybackState::Idle,
            muted: start_muted,
            autoplay,
            start_muted,
            active_id: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Bind a new entry: tear down the previous binding (pause, mute reset,
    /// back to `Idle`), then load and, if configured, start playback.
    /// Autoplay refusal parks in `Paused`.
    pub fn open(&mut self, video_id: &str, url: &str) -> Result<()> {
        self.teardown();

        self.state = PlaybackState::Loading;
        self.active_id = Some(video_id.to_string());
        if let Err(err) = self.element.load(url) {
            self.state = PlaybackState::Idle;
            self.active_id = None;
            return Err(err);
        }
        self.element.set_muted(self.muted)?;

        if self.autoplay {
            match self.element.play()? {
                PlayOutcome::Started => self.state = PlaybackState::Playing,
                PlayOutcome::Blocked => self.state = PlaybackState::Paused,
            }
        } else {
            self.state = PlaybackState::Paused;
        }
        Ok(())
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Playing => {
                self.element.pause()?;
                self.state = PlaybackState::Paused;
            }
            PlaybackState::Paused | PlaybackState::Ended => {
                if let PlayOutcome::Started = self.element.play()? {
                    self.state = PlaybackState::Playing;
                }
            }
            PlaybackState::Idle | PlaybackState::Loading => {}
        }
        Ok(())
    }

    pub fn toggle_mute(&mut self) -> Result<()> {
        self.muted = !self.muted;
        self.element.set_muted(self.muted)?;
        Ok(())
    }

    /// Called once per session tick. Reports `Ended` exactly once when the
    /// active media completes.
    pub fn poll(&mut self) -> Result<Option<PlaybackEvent>> {
        if self.state != PlaybackState::Playing {
            return Ok(None);
        }
        if self.element.poll_ended()? {
            self.state = PlaybackState::Ended;
            return Ok(Some(PlaybackEvent::Ended));
        }
        Ok(None)
    }

    /// Release the binding: pause whatever is attached, reset the mute state
    /// to its configured default, drop back to `Idle`.
    pub fn teardown(&mut self) {
        if self.state == PlaybackState::Playing {
            let _ = self.element.pause();
        }
        self.element.unload();
        self.muted = self.start_muted;
        self.state = PlaybackState::Idle;
        self.active_id = None;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedElement;
    use super::*;
    use std::sync::atomic::Ordering;

    fn controller() -> (Controller, std::sync::Arc<std::sync::atomic::AtomicBool>) {
        let element = ScriptedElement::new();
        let ended = element.ended_flag();
        (Controller::new(Box::new(element), true, true), ended)
    }

    #[test]
    fn open_autoplays_into_playing() {
        let (mut controller, _ended) = controller();
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(controller.active_id(), Some("v1"));
    }

    #[test]
    fn autoplay_refusal_parks_in_paused() {
        let mut element = ScriptedElement::new();
        element.play_outcomes.push_back(PlayOutcome::Blocked);
        let mut controller = Controller::new(Box::new(element), true, true);
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        assert_eq!(controller.state(), PlaybackState::Paused);
    }

    #[test]
    fn autoplay_disabled_starts_paused() {
        let element = ScriptedElement::new();
        let mut controller = Controller::new(Box::new(element), false, true);
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        assert_eq!(controller.state(), PlaybackState::Paused);
    }

    #[test]
    fn switching_entries_tears_down_first() {
        let (mut controller, _ended) = controller();
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        controller.toggle_mute().unwrap();
        assert!(!controller.is_muted());
        controller.open("v2", "https://cdn/v2.mp4").unwrap();
        // teardown resets the mute state before the next binding
        assert!(controller.is_muted());
        assert_eq!(controller.active_id(), Some("v2"));
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn toggle_play_flips_between_playing_and_paused() {
        let (mut controller, _ended) = controller();
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        controller.toggle_play().unwrap();
        assert_eq!(controller.state(), PlaybackState::Paused);
        controller.toggle_play().unwrap();
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn poll_reports_ended_once() {
        let (mut controller, ended) = controller();
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        assert_eq!(controller.poll().unwrap(), None);
        ended.store(true, Ordering::SeqCst);
        assert_eq!(controller.poll().unwrap(), Some(PlaybackEvent::Ended));
        // state has left Playing, so no duplicate event
        assert_eq!(controller.poll().unwrap(), None);
        assert_eq!(controller.state(), PlaybackState::Ended);
    }

    #[test]
    fn replay_after_ended_returns_to_playing() {
        let (mut controller, ended) = controller();
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        ended.store(true, Ordering::SeqCst);
        controller.poll().unwrap();
        controller.toggle_play().unwrap();
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn teardown_resets_to_idle() {
        let (mut controller, _ended) = controller();
        controller.open("v1", "https://cdn/v1.mp4").unwrap();
        controller.teardown();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.active_id(), None);
    }
}
