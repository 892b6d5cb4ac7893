//! Interaction state machine.
//!
//! Pointer events are mapped into image space, captured by the
//! [`PathRecorder`] while drawing, and committed to the injected
//! [`AnnotationStore`]. Every commit is followed by exactly one redraw.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use rand::Rng;

use crate::color;
use crate::config::EngineConfig;
use crate::error::{ResourceError, Result, StateError};
use crate::geometry::{to_image_space, ElementBounds, Point};
use crate::model::{Annotation, AnnotationSet, Geometry, TextLabel, Tool};
use crate::recorder::PathRecorder;
use crate::render::{Composite, LiveStroke, Renderer};
use crate::source::{check_size, ImageRef, ImageSource};
use crate::store::AnnotationStore;

pub trait IdGenerator {
    fn next_id(&mut self) -> String;
}

/// `ann-` followed by 16 random hex digits.
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> String {
        format!("ann-{:016x}", rand::thread_rng().gen::<u64>())
    }
}

/// Deterministic ids, used for replays and tests.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Drawing,
    PlacingText,
}

/// Emitted when the machine suspends for the operator's text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRequest {
    pub anchor: Point,
}

/// Answer to a pending [`TextRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextInput {
    Value(String),
    Cancelled,
}

impl From<Option<String>> for TextInput {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Cancelled,
        }
    }
}

/// What a pointer or text event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Ignored,
    StrokeStarted,
    StrokeExtended,
    TextRequested(TextRequest),
    TextCancelled,
    Committed(Annotation),
    /// Pointer released with an empty path buffer.
    Discarded,
}

#[derive(Debug)]
enum Interaction {
    Idle,
    Drawing {
        recorder: PathRecorder,
        color: String,
    },
    PlacingText {
        anchor: Point,
    },
}

impl Interaction {
    fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Drawing { .. } => Phase::Drawing,
            Self::PlacingText { .. } => Phase::PlacingText,
        }
    }
}

pub struct AnnotationEngine<S: AnnotationStore> {
    config: EngineConfig,
    renderer: Renderer,
    store: S,
    image: ImageRef,
    base: Option<DynamicImage>,
    user: String,
    tool: Tool,
    color: String,
    interaction: Interaction,
    ids: Box<dyn IdGenerator>,
    clock: Box<dyn Clock>,
    composite: Option<Composite>,
    frames: u64,
}

impl<S: AnnotationStore> AnnotationEngine<S> {
    /// Starts idle with the stroke tool and the configured default color.
    /// Interaction stays blocked until a base image is attached.
    pub fn new(store: S, image: ImageRef, user: impl Into<String>, config: EngineConfig) -> Self {
        let color = color::normalize(&config.default_color)
            .unwrap_or_else(|_| crate::config::DEFAULT_COLOR.to_string());
        Self {
            renderer: Renderer::from_config(&config),
            config,
            store,
            image,
            base: None,
            user: user.into(),
            tool: Tool::Stroke,
            color,
            interaction: Interaction::Idle,
            ids: Box::new(RandomIds),
            clock: Box::new(SystemClock),
            composite: None,
            frames: 0,
        }
    }

    pub fn with_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Resolves the base image through `source`. On failure the engine stays
    /// blocked and no composite is kept.
    pub fn load_image(&mut self, source: &dyn ImageSource) -> Result<()> {
        match source.load(&self.image) {
            Ok(image) => {
                self.attach(image);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(url = %self.image.url, error = %err, "base image unavailable");
                self.base = None;
                self.composite = None;
                Err(err.into())
            }
        }
    }

    /// Replaces the base image. Its pixels must match the declared size.
    pub fn set_base_image(&mut self, image: DynamicImage) -> Result<()> {
        check_size(&self.image, &image)?;
        self.attach(image);
        Ok(())
    }

    fn attach(&mut self, image: DynamicImage) {
        self.base = Some(image);
        self.redraw();
    }

    pub fn set_tool(&mut self, tool: Tool) -> Result<()> {
        match self.interaction {
            Interaction::Idle => {
                tracing::debug!(?tool, "tool selected");
                self.tool = tool;
                Ok(())
            }
            Interaction::Drawing { .. } => Err(StateError::ToolSwitchWhileBusy("drawing").into()),
            Interaction::PlacingText { .. } => {
                Err(StateError::ToolSwitchWhileBusy("awaiting text").into())
            }
        }
    }

    /// Legal in any phase. The live preview switches immediately; an
    /// in-progress stroke still commits with its starting color.
    pub fn set_color(&mut self, raw: &str) -> Result<()> {
        self.color = color::normalize(raw)?;
        tracing::debug!(color = %self.color, "color selected");
        self.redraw();
        Ok(())
    }

    pub fn pointer_down(&mut self, screen: Point, bounds: ElementBounds) -> Result<Transition> {
        self.ensure_interactive()?;
        match (&self.interaction, self.tool) {
            (Interaction::Idle, Tool::Stroke) => {
                let point = self.map(screen, bounds);
                let mut recorder = PathRecorder::new();
                recorder.start(point);
                self.interaction = Interaction::Drawing {
                    recorder,
                    color: self.color.clone(),
                };
                tracing::debug!(x = point.x, y = point.y, "stroke started");
                self.redraw();
                Ok(Transition::StrokeStarted)
            }
            _ => Ok(Transition::Ignored),
        }
    }

    pub fn pointer_move(&mut self, screen: Point, bounds: ElementBounds) -> Result<Transition> {
        self.ensure_interactive()?;
        let point = self.map(screen, bounds);
        match &mut self.interaction {
            Interaction::Drawing { recorder, .. } => {
                recorder.extend(point);
                self.redraw();
                Ok(Transition::StrokeExtended)
            }
            _ => Ok(Transition::Ignored),
        }
    }

    pub fn pointer_up(&mut self) -> Result<Transition> {
        self.ensure_interactive()?;
        self.finish_stroke()
    }

    /// A drag that leaves the surface without a pointer-up commits what was
    /// captured so far.
    pub fn pointer_leave(&mut self) -> Result<Transition> {
        self.ensure_interactive()?;
        if matches!(self.interaction, Interaction::Drawing { .. }) {
            tracing::debug!("pointer left mid-stroke; committing captured path");
        }
        self.finish_stroke()
    }

    /// With the text tool, suspends in `PlacingText` and asks for input.
    pub fn click(&mut self, screen: Point, bounds: ElementBounds) -> Result<Transition> {
        self.ensure_interactive()?;
        match (&self.interaction, self.tool) {
            (Interaction::Idle, Tool::Text) => {
                let anchor = self.map(screen, bounds);
                self.interaction = Interaction::PlacingText { anchor };
                tracing::debug!(x = anchor.x, y = anchor.y, "awaiting annotation text");
                Ok(Transition::TextRequested(TextRequest { anchor }))
            }
            _ => Ok(Transition::Ignored),
        }
    }

    /// Resumes a pending text request. Cancelled or blank input commits
    /// nothing.
    pub fn provide_text(&mut self, input: TextInput) -> Result<Transition> {
        let Interaction::PlacingText { anchor } = self.interaction else {
            return Err(StateError::NoPendingText.into());
        };
        self.interaction = Interaction::Idle;
        match input {
            TextInput::Value(text) if !text.trim().is_empty() => {
                let geometry = Geometry::Text(TextLabel {
                    x: anchor.x,
                    y: anchor.y,
                    text,
                });
                let color = self.color.clone();
                self.commit(geometry, color)
            }
            _ => {
                tracing::debug!("text placement cancelled");
                Ok(Transition::TextCancelled)
            }
        }
    }

    /// Click followed by a synchronous prompt, for hosts with a blocking
    /// input dialog.
    pub fn click_with_prompt<F>(
        &mut self,
        screen: Point,
        bounds: ElementBounds,
        prompt: F,
    ) -> Result<Transition>
    where
        F: FnOnce(TextRequest) -> Option<String>,
    {
        match self.click(screen, bounds)? {
            Transition::TextRequested(request) => self.provide_text(prompt(request).into()),
            other => Ok(other),
        }
    }

    /// Renders the current state without touching the cached composite.
    pub fn render(&self) -> Result<Composite> {
        let base = self
            .base
            .as_ref()
            .ok_or_else(|| ResourceError::NotLoaded(self.image.url.clone()))?;
        Ok(self
            .renderer
            .render(base, self.store.list(), self.live_stroke()))
    }

    pub fn phase(&self) -> Phase {
        self.interaction.phase()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_blocked(&self) -> bool {
        self.base.is_none()
    }

    pub fn pending_text(&self) -> Option<TextRequest> {
        match self.interaction {
            Interaction::PlacingText { anchor } => Some(TextRequest { anchor }),
            _ => None,
        }
    }

    pub fn in_progress(&self) -> &[Point] {
        match &self.interaction {
            Interaction::Drawing { recorder, .. } => recorder.points(),
            _ => &[],
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.store.list()
    }

    /// Full ordered set, ready to hand to external persistence.
    pub fn snapshot(&self) -> AnnotationSet {
        AnnotationSet::from(self.store.list().to_vec())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Most recent composite produced by an automatic redraw.
    pub fn composite(&self) -> Option<&Composite> {
        self.composite.as_ref()
    }

    /// Number of redraws performed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn ensure_interactive(&self) -> Result<()> {
        if self.base.is_none() {
            return Err(StateError::ImageUnavailable.into());
        }
        if matches!(self.interaction, Interaction::PlacingText { .. }) {
            return Err(StateError::AwaitingText.into());
        }
        Ok(())
    }

    fn map(&self, screen: Point, bounds: ElementBounds) -> Point {
        to_image_space(screen, bounds, self.image.size, self.config.mapping)
    }

    fn finish_stroke(&mut self) -> Result<Transition> {
        let Interaction::Drawing { mut recorder, color } =
            std::mem::replace(&mut self.interaction, Interaction::Idle)
        else {
            return Ok(Transition::Ignored);
        };
        let points = recorder.finish();
        if points.is_empty() {
            self.redraw();
            return Ok(Transition::Discarded);
        }
        self.commit(Geometry::Stroke(points), color)
    }

    fn commit(&mut self, geometry: Geometry, color: String) -> Result<Transition> {
        let annotation = Annotation {
            id: self.ids.next_id(),
            geometry,
            color,
            created_by: self.user.clone(),
            created_at: self.clock.now(),
        };
        annotation.validate()?;
        let appended = self.store.append(annotation.clone());
        // The live path is gone either way; a failed append leaves the store
        // untouched, so the frame never shows an unsaved record.
        self.redraw();
        if let Err(err) = appended {
            tracing::warn!(id = %annotation.id, error = %err, "annotation not persisted");
            return Err(err.into());
        }
        tracing::info!(
            id = %annotation.id,
            kind = ?annotation.geometry.tool(),
            "annotation committed"
        );
        Ok(Transition::Committed(annotation))
    }

    fn live_stroke(&self) -> Option<LiveStroke<'_>> {
        match &self.interaction {
            Interaction::Drawing { recorder, .. } => Some(LiveStroke {
                points: recorder.points(),
                color: &self.color,
            }),
            _ => None,
        }
    }

    fn redraw(&mut self) {
        let Some(base) = self.base.as_ref() else {
            return;
        };
        let composite = self
            .renderer
            .render(base, self.store.list(), self.live_stroke());
        self.composite = Some(composite);
        self.frames += 1;
    }
}
