use serde::{Deserialize, Serialize};

use voicetally_core::StatKind;

/// Language of user-visible replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ja" | "ja-jp" => Ok(Locale::Ja),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            other => Err(format!("unsupported locale '{other}'")),
        }
    }
}

/// Localized strings for replies and chart text.
#[derive(Debug, Clone, Copy)]
pub struct Messages {
    locale: Locale,
}

impl Messages {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn no_data(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "このサーバーにはまだデータがありません。",
            Locale::En => "There is no voice activity recorded for this server yet.",
        }
    }

    /// Reply when the command itself fails outside a report.
    pub fn command_error(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "統計の生成中にエラーが発生しました。しばらくしてからもう一度お試しください。",
            Locale::En => "Something went wrong while generating statistics. Please try again later.",
        }
    }

    pub fn report_error(&self, kind: StatKind) -> &'static str {
        match (self.locale, kind) {
            (Locale::Ja, StatKind::Channel) => "チャンネル統計の生成中にエラーが発生しました。",
            (Locale::Ja, StatKind::User) => "ユーザー統計の生成中にエラーが発生しました。",
            (Locale::En, StatKind::Channel) => "Failed to generate channel statistics.",
            (Locale::En, StatKind::User) => "Failed to generate user statistics.",
        }
    }

    pub fn chart_title(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "ボイスチャンネル使用統計",
            Locale::En => "Voice Channel Usage",
        }
    }

    pub fn y_axis_label(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "合計時間 (時間)",
            Locale::En => "Total time (hours)",
        }
    }

    pub fn hours_suffix(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "時間",
            Locale::En => "h",
        }
    }

    pub fn dataset_label(&self) -> &'static str {
        "Total Time (hours)"
    }

    /// Option label shown in the slash-command picker.
    pub fn kind_choice(&self, kind: StatKind) -> &'static str {
        match (self.locale, kind) {
            (Locale::Ja, StatKind::Channel) => "チャンネル別",
            (Locale::Ja, StatKind::User) => "ユーザー別",
            (Locale::En, StatKind::Channel) => "By channel",
            (Locale::En, StatKind::User) => "By user",
        }
    }

    pub fn command_description(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "ボイスチャンネルの利用統計を表示",
            Locale::En => "Show voice channel usage statistics",
        }
    }

    pub fn kind_option_description(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "統計の種類",
            Locale::En => "Kind of statistics",
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::new(Locale::default())
    }
}
