//! Shared UI icons and emojis.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Loop indicators
pub static ARROW: Emoji<'_, '_> = Emoji("➡️  ", "->");
pub static REPLAN: Emoji<'_, '_> = Emoji("🔄 ", "[REPLAN]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static COMMIT: Emoji<'_, '_> = Emoji("📌 ", "[COMMIT]");
