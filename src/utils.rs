use indicatif::ProgressStyle;

/// 统一的进度条样式
pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})",
    )
    .expect("进度条模板不合法")
    .progress_chars("#>-")
}
