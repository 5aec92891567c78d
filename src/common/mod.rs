//! 公共工具

pub mod auth;

/// Key 脱敏显示（只保留前 8 位），用于日志
pub fn mask_key(key: &str) -> String {
    match key.char_indices().nth(8) {
        Some((idx, _)) => format!("{}***", &key[..idx]),
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijkl"), "sk-abcde***");
        assert_eq!(mask_key("short"), "***");
        assert_eq!(mask_key("12345678"), "***");
    }
}
