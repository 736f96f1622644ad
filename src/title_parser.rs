//! foobar2000 窗口标题的解析。
//!
//! 播放器在播放时把标题栏设置为 `"<标题> | <艺术家> | <专辑>"`，末尾通常附带
//! `[foobar2000]` 标记；停止时标题栏只显示版本横幅，如 `"foobar2000 v1.6.16"`。
//! 这里的解析是纯函数，不做任何 I/O。
//!
//! ## 已知限制
//! 解析完全依赖位置：任何字段本身含有 `" | "`，或者某个字段缺失（例如没有专辑标签），
//! 都会导致分段数不等于 3，结果为 [`ParsedTitle::Malformed`]。调用方将其视为空闲状态。
//!
//! 即使字段本身不含 `" | "`，以下字段经过 [`format_title`] 之后也无法原样解析回来：
//! - 以 `" |"` 结尾或以 `"| "` 开头的字段：与相邻的分隔符拼出新的 `" | "`，
//!   例如 `("x |", "y", "z")` 会被解析为标题 `"x"`、艺术家 `"| y"`。
//! - 首尾带空白的字段：每个字段在拆分后都会被修剪，`" lead"` 解析为 `"lead"`。

use regex::Regex;

use crate::api::TrackMetadata;

/// 标题栏中分隔三个字段的字面量。
pub const FIELD_DELIMITER: &str = " | ";

/// 一次标题解析的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTitle {
    /// 没有在播放：标题为空、只有空白，或者是版本横幅。
    Idle,
    /// 成功拆分出三个字段。
    Track(TrackMetadata),
    /// 分段数不是 3。曲目切换期间标题可能短暂处于这种状态。
    Malformed {
        /// 实际得到的分段数。
        segments: usize,
    },
}

impl ParsedTitle {
    /// 将解析结果归一化为要发布的元数据。`Idle` 与 `Malformed` 都对应空元数据。
    pub fn into_metadata(self) -> TrackMetadata {
        match self {
            ParsedTitle::Track(metadata) => metadata,
            ParsedTitle::Idle | ParsedTitle::Malformed { .. } => TrackMetadata::default(),
        }
    }

    /// 该结果是否表示正在播放。
    pub fn is_playing(&self) -> bool {
        matches!(self, ParsedTitle::Track(_))
    }
}

/// 绑定到某个应用名称的标题解析器。
///
/// 应用名称决定了两件事：版本横幅的匹配，以及需要从各字段中剥离的标记。
#[derive(Debug, Clone)]
pub struct TitleParser {
    banner: Regex,
    marker: Regex,
}

impl TitleParser {
    /// 为给定的应用名称（如 `"foobar2000"`）构建解析器。
    ///
    /// 版本横幅接受 `vX.Y` 与 `vX.Y.Z` 两种形式；foobar2000 2.x 的横幅省略了补丁号。
    pub fn new(app_name: &str) -> Self {
        let name = regex::escape(app_name.trim());
        // 两个模式都只由转义后的字面量和固定语法组成，不会编译失败。
        let banner = Regex::new(&format!(r"^{name} v\d+\.\d+(?:\.\d+)?$"))
            .expect("版本横幅模式无效");
        // 标记必须独立成词，"foobar20000" 之类的文本不会被误删。
        let marker = Regex::new(&format!(r"\[{name}\]|\b{name}\b")).expect("应用标记模式无效");
        Self { banner, marker }
    }

    /// 解析一次原始窗口标题。
    pub fn parse(&self, raw_title: &str) -> ParsedTitle {
        let trimmed = raw_title.trim();
        if trimmed.is_empty() || self.banner.is_match(trimmed) {
            return ParsedTitle::Idle;
        }

        let segments: Vec<String> = raw_title
            .split(FIELD_DELIMITER)
            .map(|segment| self.marker.replace_all(segment, "").trim().to_string())
            .collect();

        let [title, artist, album]: [String; 3] = match segments.try_into() {
            Ok(fields) => fields,
            Err(segments) => {
                return ParsedTitle::Malformed {
                    segments: segments.len(),
                };
            }
        };

        let metadata = TrackMetadata {
            title,
            artist,
            album,
        };
        if metadata.is_empty() {
            ParsedTitle::Idle
        } else {
            ParsedTitle::Track(metadata)
        }
    }
}

impl Default for TitleParser {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_APP_NAME)
    }
}

/// 按播放器标题栏的格式拼接三个字段，是 [`TitleParser::parse`] 的逆操作。
pub fn format_title(title: &str, artist: &str, album: &str) -> String {
    [title, artist, album].join(FIELD_DELIMITER)
}
