//! 输出规范化模块
//! 把通道上累积的原始字节转换为可直接展示的文本

/// 命令无输出时返回的固定文本
pub const NO_OUTPUT: &str = "Command produced no output.";

/// 规范化输出：宽松解码 UTF-8、统一换行、去除首尾空白，空结果替换为固定文本
pub fn normalize(raw: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(raw);
    let unified = decoded.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();

    if trimmed.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 以代码块形式渲染，保留原始排版
pub fn render_markdown(output: &str) -> String {
    format!("```\n{}\n```", output)
}

/// 生成摘要（按字符边界截断）
pub fn summary(output: &str, max_len: usize) -> String {
    if output.len() <= max_len {
        return output.to_string();
    }

    let mut end = max_len;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &output[..end])
}
