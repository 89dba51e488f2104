use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tokio::runtime::Runtime;

use gateway_core::channel::{Channel, ChannelConfig, ChannelStatus, ModelMapping, ProviderKind};
use gateway_core::load_balancer::{LoadBalanceStrategy, LoadBalancer, StaticChannelSource};
use gateway_core::metrics_store::InMemoryMetricsStore;
use gateway_core::models::{ChatRequest, Message};

fn channel(id: &str, weight: u32) -> (Channel, ModelMapping) {
    let channel = Channel {
        id: id.to_string(),
        provider_kind: ProviderKind::OpenAi,
        config: ChannelConfig { api_key: "test-key".to_string(), ..Default::default() },
        weight,
        priority: 0,
        status: ChannelStatus::Active,
        is_system: false,
    };
    let mapping =
        ModelMapping { channel_id: id.to_string(), public_model_id: "gpt-4".to_string(), upstream_model_id: "gpt-4".to_string() };
    (channel, mapping)
}

fn bench_message_creation(c: &mut Criterion) {
    c.bench_function("message_creation", |b| {
        b.iter(|| {
            let _user_msg = Message::user("Hello, world!");
            let _assistant_msg = Message::assistant("Hi there!");
            let _system_msg = Message::system("You are a helpful assistant.");
        });
    });
}

fn bench_request_serialization(c: &mut Criterion) {
    let request = ChatRequest {
        model: "gpt-4".to_string(),
        messages: vec![Message::system("You are a helpful assistant."), Message::user("Hello, how are you?")],
        temperature: Some(0.7),
        max_tokens: Some(100),
        stream: Some(false),
        top_p: None,
        frequency_penalty: None,
        presence_penalty: None,
    };

    c.bench_function("request_serialization", |b| {
        b.iter(|| {
            let _json = serde_json::to_string(black_box(&request));
        });
    });

    c.bench_function("request_deserialization", |b| {
        let json = serde_json::to_string(&request).unwrap();
        b.iter(|| {
            let _request: ChatRequest = serde_json::from_str(black_box(&json)).unwrap();
        });
    });
}

fn bench_load_balancer_select(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let source = StaticChannelSource::new(vec![channel("c1", 1), channel("c2", 2), channel("c3", 1)]);

    for strategy in [
        LoadBalanceStrategy::Random,
        LoadBalanceStrategy::WeightedRandom,
        LoadBalanceStrategy::LowestCost,
        LoadBalanceStrategy::BestPerformance,
    ] {
        c.bench_function(&format!("load_balancer_select_{strategy:?}"), |b| {
            b.to_async(&rt).iter_batched(
                || LoadBalancer::new(Arc::new(InMemoryMetricsStore::new())),
                |lb| {
                    let source = &source;
                    async move {
                        let _ = black_box(lb.select(source, "gpt-4", "owner-1", Some(strategy), None).await);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(benches, bench_message_creation, bench_request_serialization, bench_load_balancer_select);
criterion_main!(benches);
