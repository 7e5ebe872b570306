use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Accent colour used for notice embeds (National Assembly blue).
const EMBED_COLOR: u32 = 0x003_87D;
const WELCOME_COLOR: u32 = 0x57F2_87;

/// One scraped legislative announcement. `num` is assigned monotonically by
/// the upstream index (higher = newer) and is the sole identity for diffing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub num: i64,
    pub subject: String,
    pub proposer_category: String,
    pub committee: String,
    pub link: String,
}

/// Discord-compatible embed object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoticeEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: EmbedFooter,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl NoticeEmbed {
    /// Builds the notification embed for a newly observed notice.
    #[must_use]
    pub fn for_notice(notice: &Notice) -> Self {
        Self {
            title: format!("\u{1f4e2} {}", notice.subject),
            description: None,
            url: Some(notice.link.clone()),
            color: EMBED_COLOR,
            fields: vec![
                EmbedField { name: "제안자 구분".to_string(), value: notice.proposer_category.clone(), inline: true },
                EmbedField { name: "소관 위원회".to_string(), value: notice.committee.clone(), inline: true },
                EmbedField { name: "공고 번호".to_string(), value: notice.num.to_string(), inline: true },
            ],
            timestamp: Utc::now().to_rfc3339(),
            footer: EmbedFooter { text: "국회 입법예고 알림".to_string() },
        }
    }

    /// Embed used for the live delivery test during registration, doubling as
    /// the subscriber greeting.
    #[must_use]
    pub fn welcome() -> Self {
        Self {
            title: "\u{2705} 입법예고 알림 등록 완료".to_string(),
            description: Some(
                "이 채널로 새로운 입법예고가 올라올 때마다 알림을 보내드립니다.".to_string(),
            ),
            url: None,
            color: WELCOME_COLOR,
            fields: Vec::new(),
            timestamp: Utc::now().to_rfc3339(),
            footer: EmbedFooter { text: "국회 입법예고 알림".to_string() },
        }
    }
}
