// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

//! Rendering and stream parsing throughput.
//!
//! Measures:
//! - Markdown rendering of a typical recommendation answer
//! - Think-block splitting of a partially streamed answer
//! - Frame decoding and parsing of a chunked SSE body
//!
//! Run: cargo bench --bench render_latency

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use evchat::render::{markdown_to_html, split_think_blocks, MarkdownRenderer};
use evchat::stream::{parse_frame, FrameDecoder, StreamEvent};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const ANSWER: &str = r#"## 推荐车型

根据您的预算和 **续航** 要求，推荐以下车型：

1. 车型A：CLTC 续航 *700km*，[详情](https://example.com/a)
2. 车型B：支持 `800V` 快充
3. 车型C：空间更大

> 以上价格为官方指导价

- 城市通勤优先考虑能耗
- 长途出行关注补能网络

```
range_km = 700
```
"#;

fn streamed_answer(repeat: usize) -> String {
    let mut out = String::from("<think>比较三款车型的续航与价格</think>");
    for _ in 0..repeat {
        out.push_str(ANSWER);
    }
    out.push_str("<think>还在核对补贴政策");
    out
}

fn sse_body(frames: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..frames {
        if i % 5 == 0 {
            out.push_str("event: agent_thought\ndata: {\"thought\":\"查询数据库\",\"tool\":\"ev_db\"}\n\n");
        } else {
            out.push_str(&format!(
                "event: message\r\ndata: {{\"answer\":\"推荐车型{i}\",\"conversation_id\":\"c-1\"}}\r\n\r\n"
            ));
        }
    }
    out.push_str("data: [DONE]\n\n");
    out.into_bytes()
}

// ---------------------------------------------------------------------------
// Benches
// ---------------------------------------------------------------------------

fn bench_markdown(c: &mut Criterion) {
    let renderer = MarkdownRenderer::new();
    let mut group = c.benchmark_group("markdown");
    for repeat in [1usize, 10] {
        let input = ANSWER.repeat(repeat);
        group.bench_with_input(BenchmarkId::from_parameter(repeat), &input, |b, input| {
            b.iter(|| renderer.render(black_box(input)))
        });
    }
    group.bench_function("shared_renderer", |b| {
        b.iter(|| markdown_to_html(black_box(ANSWER)))
    });
    group.finish();
}

fn bench_think_split(c: &mut Criterion) {
    let input = streamed_answer(10);
    c.bench_function("think_split", |b| b.iter(|| split_think_blocks(black_box(&input))));
}

fn bench_frames(c: &mut Criterion) {
    let body = sse_body(200);
    let mut group = c.benchmark_group("frames");
    for chunk_size in [16usize, 512] {
        group.bench_with_input(BenchmarkId::new("decode_parse", chunk_size), &body, |b, body| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                let mut events = 0usize;
                for chunk in body.chunks(chunk_size) {
                    for frame in decoder.push(chunk) {
                        if let Some(raw) = parse_frame(&frame) {
                            black_box(StreamEvent::from_raw(&raw));
                            events += 1;
                        }
                    }
                }
                events
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_markdown, bench_think_split, bench_frames);
criterion_main!(benches);
