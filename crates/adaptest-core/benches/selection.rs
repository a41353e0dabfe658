use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use adaptest_core::model::{Question, QuestionPool, QuestionType, Subject, SubjectQuota};
use adaptest_core::selector::{draw_batch, QuestionSelector, SelectionRequest};

fn make_pool(per_level: usize) -> QuestionPool {
    let mut questions = Vec::new();
    for subject in Subject::ALL {
        for question_type in QuestionType::ALL {
            for difficulty in 1..=10u8 {
                for i in 0..per_level {
                    questions.push(Question {
                        id: format!("{subject}-{question_type}-{difficulty}-{i}"),
                        subject,
                        question_type,
                        difficulty,
                        prompt: "bench".into(),
                        options: vec![String::new(); question_type.option_count()],
                        correct: vec![0],
                        topic: String::new(),
                        explanation: String::new(),
                        trap: i % 4 == 0,
                        passage_group: None,
                    });
                }
            }
        }
    }
    QuestionPool::new("bench", "Bench", questions)
}

fn bench_adaptive_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_select");
    let pool = make_pool(10);
    let empty = HashSet::new();
    let mostly_used: HashSet<String> = pool
        .questions
        .iter()
        .filter(|q| q.difficulty != 1)
        .map(|q| q.id.clone())
        .collect();

    group.bench_function("exact_tier", |b| {
        let mut selector = QuestionSelector::seeded(1);
        let request = SelectionRequest {
            target: 6,
            subject: Subject::Mathematics,
            question_type: QuestionType::Multiple,
            prefer_trap: true,
            excluded: &empty,
        };
        b.iter(|| selector.select(black_box(&pool), black_box(&request)).is_ok())
    });

    group.bench_function("widened", |b| {
        let mut selector = QuestionSelector::seeded(1);
        let request = SelectionRequest {
            target: 9,
            subject: Subject::Logic,
            question_type: QuestionType::Single,
            prefer_trap: false,
            excluded: &mostly_used,
        };
        b.iter(|| selector.select(black_box(&pool), black_box(&request)).is_ok())
    });

    group.finish();
}

fn bench_batch_draw(c: &mut Criterion) {
    let pool = make_pool(10);
    let quotas: Vec<SubjectQuota> = Subject::ALL
        .iter()
        .map(|&s| SubjectQuota::new(s, 10, 5))
        .collect();

    c.bench_function("batch_draw_60", |b| {
        b.iter(|| draw_batch(black_box(&pool), black_box(&quotas), black_box(5)).len())
    });
}

criterion_group!(benches, bench_adaptive_select, bench_batch_draw);
criterion_main!(benches);
