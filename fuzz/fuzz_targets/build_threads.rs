#![no_main]

use libfuzzer_sys::fuzz_target;
use mailscope_analytics::{Thread, ThreadOptions, build_threads_with, flatten_thread};
use mailscope_core::Message;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let messages: Vec<Message> = text
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    let options = ThreadOptions { max_display_depth: 3 };
    let threads = build_threads_with(&messages, &options);

    // Every message lands in exactly one thread.
    let total: usize = threads.iter().map(Thread::len).sum();
    assert_eq!(total, messages.len());

    for thread in &threads {
        let flat = flatten_thread(thread);
        assert_eq!(flat.len(), thread.len());
        for node in flat {
            assert!(node.depth <= options.max_display_depth);
            assert_eq!(node.depth_overflow, node.true_depth > options.max_display_depth);
        }
    }
});
