use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

pub fn effective_home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("環境変数 HOME が設定されていません"))
}

pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text))
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut out = std::io::stdout();
    if !out.is_terminal() {
        return Err(anyhow!(
            "標準出力が端末ではないため、クリップボードにコピーできません"
        ));
    }
    out.write_all(osc52_sequence(text).as_bytes())
        .and_then(|_| out.flush())
        .context("クリップボードへの書き込みに失敗しました")
}
