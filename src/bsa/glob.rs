//! 归档路径通配符匹配
//!
//! 支持 `*`（单层内任意字符）、`?`（单个字符）与 `**`（任意层目录，含零层）。

/// 判断 `path` 是否匹配 `pattern`，两者均使用 `/` 分隔
pub fn glob_match(pattern: &str, path: &str, case_sensitive: bool) -> bool {
    let (pattern, path) = if case_sensitive {
        (pattern.to_string(), path.to_string())
    } else {
        (pattern.to_lowercase(), path.to_lowercase())
    };
    let pattern = pattern.replace('\\', "/");
    let path = path.replace('\\', "/");

    let pattern_segments: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            // 吞掉 0..=n 个路径段
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((segment, rest)) => match path.split_first() {
            Some((name, path_rest)) => {
                match_segment(segment.as_bytes(), name.as_bytes()) && match_segments(rest, path_rest)
            }
            None => false,
        },
    }
}

/// 单个路径段内的通配符匹配（回溯实现）
fn match_segment(pattern: &[u8], name: &[u8]) -> bool {
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = star {
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
