//! Reveal animation: which frames an encounter shows and how they render.

use {beenbag_common::OutboundMessage, rand::Rng};

use crate::catalog::{RarityTier, SpawnEntity};

#[derive(Debug, Clone, PartialEq)]
pub struct RevealConfig {
    /// Probability of a pixelate reveal; otherwise the reveal zooms out.
    pub pixelate_chance: f64,
    /// Pixel grid sizes, coarse to fine. `0` is full resolution.
    pub pixelate_levels: Vec<u32>,
    /// Visible fraction of the image, tight to full frame.
    pub zoom_levels: Vec<f64>,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            pixelate_chance: 0.25,
            pixelate_levels: vec![1, 2, 4, 8, 16, 0],
            zoom_levels: vec![0.01, 0.05, 0.1, 0.2, 0.4, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealMode {
    Pixelate,
    Zoom,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RevealFrame {
    /// Image downsampled to a `grid`×`grid` block, or full resolution at 0.
    Pixelate { grid: u32 },
    /// Crop showing `fraction` of the image around its focal point.
    Zoom { fraction: f64 },
}

impl RevealFrame {
    #[must_use]
    pub fn is_full_view(&self) -> bool {
        match *self {
            Self::Pixelate { grid } => grid == 0,
            Self::Zoom { fraction } => fraction >= 1.0,
        }
    }
}

/// The frames one encounter steps through. A plan never mixes modes.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealPlan {
    pub mode: RevealMode,
    pub frames: Vec<RevealFrame>,
}

impl RevealPlan {
    #[must_use]
    pub fn for_mode(mode: RevealMode, config: &RevealConfig) -> Self {
        let frames = match mode {
            RevealMode::Pixelate => config
                .pixelate_levels
                .iter()
                .map(|&grid| RevealFrame::Pixelate { grid })
                .collect(),
            RevealMode::Zoom => config
                .zoom_levels
                .iter()
                .map(|&fraction| RevealFrame::Zoom { fraction })
                .collect(),
        };
        Self { mode, frames }
    }

    /// Pick the mode once for a new encounter.
    pub fn choose(config: &RevealConfig, rng: &mut impl Rng) -> Self {
        let chance = if config.pixelate_chance.is_nan() {
            0.0
        } else {
            config.pixelate_chance.clamp(0.0, 1.0)
        };
        let mode = if rng.random_bool(chance) {
            RevealMode::Pixelate
        } else {
            RevealMode::Zoom
        };
        Self::for_mode(mode, config)
    }

    /// Frame posted when the encounter is created.
    #[must_use]
    pub fn first(&self) -> Option<&RevealFrame> {
        self.frames.first()
    }

    /// Frames applied by editing after the first one.
    pub fn remaining(&self) -> impl Iterator<Item = (usize, &RevealFrame)> {
        self.frames.iter().enumerate().skip(1)
    }
}

/// Where a frame sits in its plan.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub entity: &'a SpawnEntity,
    pub tier: &'a RarityTier,
    pub frame: &'a RevealFrame,
    pub index: usize,
    pub count: usize,
}

/// Turns a reveal frame into the message shown in the channel.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, ctx: FrameContext<'_>) -> OutboundMessage;
}

/// Text-only frames. Never prints the entity's name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFrameRenderer;

impl FrameRenderer for TextFrameRenderer {
    fn render(&self, ctx: FrameContext<'_>) -> OutboundMessage {
        let view = match *ctx.frame {
            frame if frame.is_full_view() => "full view".to_string(),
            RevealFrame::Pixelate { grid } => format!("{grid}×{grid} pixels"),
            RevealFrame::Zoom { fraction } => format!("{:.0}% visible", fraction * 100.0),
        };
        OutboundMessage::text(format!(
            "**A mob is appearing!**\nSay its name to catch it.\n-# {view} ({}/{})",
            ctx.index + 1,
            ctx.count
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::{SeedableRng, rngs::StdRng},
        rstest::rstest,
        std::time::Duration,
    };

    #[rstest]
    #[case(0.0, 0)]
    #[case(1.0, 1000)]
    fn mode_chance_extremes(#[case] chance: f64, #[case] expected_pixelate: usize) {
        let config = RevealConfig {
            pixelate_chance: chance,
            ..RevealConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let pixelate = (0..1000)
            .filter(|_| RevealPlan::choose(&config, &mut rng).mode == RevealMode::Pixelate)
            .count();
        assert_eq!(pixelate, expected_pixelate);
    }

    #[test]
    fn default_chance_is_about_a_quarter() {
        let config = RevealConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let pixelate = (0..20_000)
            .filter(|_| RevealPlan::choose(&config, &mut rng).mode == RevealMode::Pixelate)
            .count();
        let share = pixelate as f64 / 20_000.0;
        assert!((share - 0.25).abs() < 0.02, "pixelate share {share}");
    }

    #[test]
    fn plans_never_mix_modes() {
        let config = RevealConfig::default();
        let zoom = RevealPlan::for_mode(RevealMode::Zoom, &config);
        assert!(zoom.frames.iter().all(|f| matches!(f, RevealFrame::Zoom { .. })));
        assert!(zoom.frames.last().unwrap().is_full_view());
        assert_eq!(zoom.remaining().count(), 5);

        let pixelate = RevealPlan::for_mode(RevealMode::Pixelate, &config);
        assert!(
            pixelate
                .frames
                .iter()
                .all(|f| matches!(f, RevealFrame::Pixelate { .. }))
        );
        assert_eq!(pixelate.first(), Some(&RevealFrame::Pixelate { grid: 1 }));
    }

    #[test]
    fn text_frames_hide_the_name() {
        let entity = SpawnEntity::new("Warden", 5);
        let tier = RarityTier {
            level: 5,
            name: "legendary".into(),
            stay: Duration::from_secs(60),
        };
        let frame = RevealFrame::Zoom { fraction: 0.05 };
        let msg = TextFrameRenderer.render(FrameContext {
            entity: &entity,
            tier: &tier,
            frame: &frame,
            index: 1,
            count: 6,
        });
        assert!(msg.content.contains("A mob is appearing!"));
        assert!(msg.content.contains("5% visible (2/6)"));
        assert!(!msg.content.contains("Warden"));
    }
}
