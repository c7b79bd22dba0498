// Colorization request builder
//
// Pure function of (configuration snapshot, attempt mode, mask presence).
// Never mutates the job or the configuration, never fails: missing title
// omits the context directive, empty custom text falls back to the default
// style.

use crate::core::types::{AttemptMode, ColorizationConfig, ColorizationStyle};

/// Constant persona and mandates, sent as the system instruction on every
/// request regardless of mode.
pub const SYSTEM_DIRECTIVE: &str = "You are a professional colorist and image editor for a manga publishing house. \
Your task is to convert black and white manga pages into fully colored anime-style illustrations, or refine existing colorizations.\n\
\n\
CRITICAL RULES - FOLLOW STRICTLY:\n\
1. COLOR EVERY PIXEL: The output must be a fully painted image. Do not leave any part of the drawing (backgrounds, corners, clothes, speed lines) in black and white.\n\
2. FILL WHITE SPACE: If a panel has a white background, you MUST fill it. Use environmental colors (blue sky, walls, trees) or abstract atmospheric colors (colored speed lines, mood lighting). NEVER leave a background plain white.\n\
3. TEXT BUBBLES: Identify speech bubbles. Keep the bubble background WHITE and the text BLACK. Do not color inside the speech bubbles. This is the ONLY allowed white space.\n\
4. REMOVE HATCHING: Interpret cross-hatching, screentones, and shading lines as color gradients/shadows, not as gray textures.\n\
5. HIGH DENSITY: The final image should look like a completed anime frame. Dense, rich colors everywhere.";

const VIBRANT: &str = "Expertly colorized manga page, full color, anime style cel shading, vibrant and distinct colors for every element, maintain original line art and composition exactly, no grayscale remaining, no black and white parts, high resolution, 4k.";
const PASTEL: &str = "Style: Shoujo Watercolor Illustration. Soft, dreamy aesthetic with full color washes. Use pinks, purples, and soft blues to fill the entire canvas. Ensure no paper white remains exposed.";
const GRITTY: &str = "Style: Seinen/Dark Fantasy. Realistic textures, heavy atmosphere, dramatic lighting. Deep earth tones and shadows. Eliminate all pure white space outside of text bubbles.";
const RETRO: &str = "Style: Vintage 90s Cel-Animation. Technicolor palette, flat colors, hard shadows. Classic anime look with full color density. Paint over all sketch lines.";
const PAINTERLY: &str = "Style: Lush Digital Painting. Soft, blended brushstrokes, no hard cel-shading. Rich, deep colors with high dynamic range. Atmospheric lighting, volumetric fog, and detailed texture rendering. Make it look like a high-end digital illustration or cover art.";

/// Structured instruction payload sent to the generation client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPayload {
    pub system_directive: &'static str,
    pub task_directive: String,
    pub style_directive: String,
    pub context_directive: String,
}

impl InstructionPayload {
    /// Joined user-visible text: task first, then style and context, with
    /// blank directives omitted.
    pub fn user_text(&self) -> String {
        [
            self.task_directive.as_str(),
            self.style_directive.as_str(),
            self.context_directive.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}

/// Inputs describing the attempt being dispatched; assembled by the batch
/// controller from the job and an optional refinement request.
#[derive(Debug, Clone, Default)]
pub struct AttemptInstruction {
    pub instruction: Option<String>,
    pub has_mask: bool,
}

fn style_directive(config: &ColorizationConfig) -> String {
    match config.style {
        ColorizationStyle::Vibrant => VIBRANT.to_string(),
        ColorizationStyle::Pastel => PASTEL.to_string(),
        ColorizationStyle::Gritty => GRITTY.to_string(),
        ColorizationStyle::Retro => RETRO.to_string(),
        ColorizationStyle::Painterly => PAINTERLY.to_string(),
        ColorizationStyle::Custom => {
            let custom = config.custom_instructions.trim();
            if custom.is_empty() {
                // User selected custom but supplied no text
                VIBRANT.to_string()
            } else {
                format!("Style: Custom User Request. Instructions: {custom}")
            }
        }
    }
}

fn context_directive(config: &ColorizationConfig) -> String {
    let title = config.title.trim();
    if title.is_empty() {
        String::new()
    } else {
        format!(
            "Context: The manga series is \"{title}\". YOU MUST use the official canon colors \
             for these characters (hair, eyes, outfit) and locations."
        )
    }
}

/// Build the full instruction payload for one attempt.
pub fn build(
    config: &ColorizationConfig,
    mode: AttemptMode,
    attempt: &AttemptInstruction,
) -> InstructionPayload {
    let style = style_directive(config);
    let context = context_directive(config);

    let task = match mode {
        AttemptMode::Initial => "Colorize this page.\n\
             Verify that every single panel is fully painted.\n\
             Do not tint the image; paint it opaque.\n\
             Do not leave the edges or backgrounds white."
            .to_string(),
        AttemptMode::AutoFix => "FIX INCOMPLETE COLORIZATION.\n\
             The provided image is a work-in-progress that still has uncolored black and white areas.\n\
             \n\
             YOUR TASK:\n\
             1. Identify any remaining grayscale, black and white, or sketch-like areas in this image.\n\
             2. Colorize ONLY those missing parts to match the existing style.\n\
             3. Do NOT change the colors of the parts that are already colored. Keep consistency.\n\
             4. Reapply the style settings below.\n\
             \n\
             Output a fully finished, opaque image with no remaining black and white zones (except text bubbles)."
            .to_string(),
        AttemptMode::CustomFix => {
            let instruction = attempt.instruction.as_deref().unwrap_or("").trim();
            let mask_clause = if attempt.has_mask {
                "\n3. The image carries a marker-colored overlay. Apply the change ONLY inside the marked region and remove the marker strokes from the output."
            } else {
                ""
            };
            format!(
                "EDITING REQUEST.\n\
                 The provided image is a colored manga page.\n\
                 \n\
                 USER INSTRUCTION: \"{instruction}\"\n\
                 \n\
                 YOUR TASK:\n\
                 1. Apply the user's specific change to the image.\n\
                 2. PRESERVE the rest of the image colors and style. Do not radically change parts the user did not ask about.{mask_clause}\n\
                 Ensure the result is still fully colored with no black and white artifacts."
            )
        }
    };

    // Custom-fix mode keeps only the user's instruction and context; the
    // style reapplication belongs to auto-fix and initial runs.
    let style = match mode {
        AttemptMode::CustomFix => String::new(),
        _ => style,
    };

    InstructionPayload {
        system_directive: SYSTEM_DIRECTIVE,
        task_directive: task,
        style_directive: style,
        context_directive: context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(style: ColorizationStyle) -> ColorizationConfig {
        ColorizationConfig {
            style,
            title: String::new(),
            custom_instructions: String::new(),
        }
    }

    #[test]
    fn empty_custom_text_falls_back_to_vibrant() {
        let cfg = config(ColorizationStyle::Custom);
        let payload = build(&cfg, AttemptMode::Initial, &AttemptInstruction::default());
        assert_eq!(payload.style_directive, VIBRANT);
    }

    #[test]
    fn custom_text_is_used_verbatim() {
        let mut cfg = config(ColorizationStyle::Custom);
        cfg.custom_instructions = "deep reds and gold accents".to_string();
        let payload = build(&cfg, AttemptMode::Initial, &AttemptInstruction::default());
        assert!(payload.style_directive.contains("deep reds and gold accents"));
    }

    #[test]
    fn missing_title_omits_context_directive() {
        let cfg = config(ColorizationStyle::Vibrant);
        let payload = build(&cfg, AttemptMode::Initial, &AttemptInstruction::default());
        assert!(payload.context_directive.is_empty());
        assert!(!payload.user_text().contains("Context:"));
    }

    #[test]
    fn title_produces_canon_color_context() {
        let mut cfg = config(ColorizationStyle::Vibrant);
        cfg.title = "One Piece".to_string();
        let payload = build(&cfg, AttemptMode::Initial, &AttemptInstruction::default());
        assert!(payload.context_directive.contains("One Piece"));
        assert!(payload.context_directive.contains("canon colors"));
    }

    #[test]
    fn auto_fix_preserves_colored_regions_and_reapplies_style() {
        let cfg = config(ColorizationStyle::Pastel);
        let payload = build(&cfg, AttemptMode::AutoFix, &AttemptInstruction::default());
        assert!(payload.task_directive.contains("ONLY those missing parts"));
        assert_eq!(payload.style_directive, PASTEL);
    }

    #[test]
    fn custom_fix_embeds_instruction_and_mask_clause() {
        let cfg = config(ColorizationStyle::Vibrant);
        let attempt = AttemptInstruction {
            instruction: Some("Make the jacket blue".to_string()),
            has_mask: true,
        };
        let payload = build(&cfg, AttemptMode::CustomFix, &attempt);
        assert!(payload.task_directive.contains("Make the jacket blue"));
        assert!(payload.task_directive.contains("ONLY inside the marked region"));
        // Style reapplication is an auto-fix concern
        assert!(payload.style_directive.is_empty());
    }

    #[test]
    fn custom_fix_without_mask_skips_mask_clause() {
        let cfg = config(ColorizationStyle::Vibrant);
        let attempt = AttemptInstruction {
            instruction: Some("brighten the sky".to_string()),
            has_mask: false,
        };
        let payload = build(&cfg, AttemptMode::CustomFix, &attempt);
        assert!(!payload.task_directive.contains("marked region"));
    }

    #[test]
    fn user_text_skips_blank_directives() {
        let cfg = config(ColorizationStyle::Vibrant);
        let payload = build(&cfg, AttemptMode::Initial, &AttemptInstruction::default());
        assert!(!payload.user_text().contains("\n\n\n"));
        assert!(payload.user_text().starts_with("Colorize this page."));
    }
}
