//! 语言与站点过滤

/// 检测结果，只区分中文与其他语言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedLanguage {
    Chinese,
    Other,
}

/// CJK 统一表意文字（含扩展 A）
fn is_cjk_ideograph(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}')
}

/// 去掉空白后的 CJK 字符占比
pub fn cjk_ratio(text: &str) -> f64 {
    let (total, cjk) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(total, cjk), c| {
            (total + 1, cjk + usize::from(is_cjk_ideograph(c)))
        });

    if total == 0 {
        0.0
    } else {
        cjk as f64 / total as f64
    }
}

/// CJK 占比超过 30% 视为中文
pub fn detect_language(text: &str) -> DetectedLanguage {
    if cjk_ratio(text) > 0.3 {
        DetectedLanguage::Chinese
    } else {
        DetectedLanguage::Other
    }
}

/// 文本是否已是目标语言；只对中文目标有效，其他目标一律翻译
pub fn should_skip_translation(text: &str, target_language: &str) -> bool {
    match target_language {
        "zh" | "zh-CN" | "zh-TW" => detect_language(text) == DetectedLanguage::Chinese,
        _ => false,
    }
}

/// 主机名是否命中排除列表
///
/// `*.example.com` 匹配任意子域名；`example.com` 匹配自身及其子域名。
pub fn is_excluded_domain(host: &str, patterns: &[String]) -> bool {
    let host = host.trim().to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }

    patterns.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern.is_empty() {
            return false;
        }
        match pattern.strip_prefix('*') {
            Some(suffix) if suffix.starts_with('.') => host.ends_with(suffix),
            _ => host == pattern || host.ends_with(&format!(".{}", pattern)),
        }
    })
}

/// 从页面 URL 取主机名
pub fn host_of(page_url: &str) -> Option<String> {
    url::Url::parse(page_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}
