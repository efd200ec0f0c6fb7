use criterion::{criterion_group, criterion_main, Criterion};
use gateway_conn_guard::ConnectionGuard;
use gateway_events::UserId;

fn admit_release_single_user(c: &mut Criterion) {
	let guard = ConnectionGuard::new(1000);
	let user = UserId::new("bench-user".to_owned());

	c.bench_function("admit_release_single_user", |b| {
		b.iter(|| {
			let admission = guard.try_admit(user.clone()).expect("should admit");
			drop(admission.permit);
		});
	});
}

fn admit_many_users(c: &mut Criterion) {
	let guard = ConnectionGuard::new(10);

	c.bench_function("admit_many_users", |b| {
		let mut counter = 0u64;
		b.iter(|| {
			counter += 1;
			let user = UserId::new(format!("user-{}", counter % 5000));
			let _ = guard.try_admit(user);
		});
	});
}

criterion_group!(benches, admit_release_single_user, admit_many_users);
criterion_main!(benches);
