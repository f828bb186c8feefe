#![no_main]

use libfuzzer_sys::fuzz_target;
use url::Url;

use satchel::extractor::extract_article;

fuzz_target!(|data: &[u8]| {
    let html = String::from_utf8_lossy(data);
    let url = Url::parse("https://example.com/article").unwrap();

    // Runs on arbitrary remote HTML and must not panic
    let _ = extract_article(&html, &url);
});
