use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::{Duration, Instant},
};

use fruition::{delay, update_delay, ContextDescriptor, ManualUpdateSource, Operation};

use _support::eventually;

#[test]
fn a_timer_delay_completes_after_its_duration() {
	let started = Instant::now();
	let delayed = delay(Duration::from_millis(50));
	delayed.wait();
	assert!(delayed.is_completed_successfully());
	assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn a_zero_delay_is_immediate() {
	let delayed = delay(Duration::ZERO);
	assert!(delayed.is_completed_successfully());
}

#[test]
fn a_timer_delay_reports_interpolated_progress() {
	let delayed = delay(Duration::from_millis(500));
	eventually(|| delayed.progress() > 0.0 && !delayed.is_completed());
	let mid = delayed.progress();
	assert!(mid > 0.0 && mid < 1.0);
	delayed.wait();
	assert_eq!(delayed.progress(), 1.0);
}

#[test]
fn a_cancelled_timer_delay_does_not_wait_out_the_clock() {
	let delayed = delay(Duration::from_secs(3600));
	delayed.cancel();
	assert!(delayed.is_canceled());
}

#[test]
fn timer_delays_complete_independently() {
	let long = delay(Duration::from_millis(400));
	let short = delay(Duration::from_millis(20));
	short.wait();
	assert!(!long.is_completed());
	long.wait();
	assert!(long.is_completed_successfully());
}

#[test]
fn an_update_delay_counts_frame_time_down() {
	let source = Arc::new(ManualUpdateSource::new());
	let delayed = update_delay(0.3, &source);
	assert_eq!(source.len(), 1);

	for _ in 0..5 {
		source.dispatch(0.05);
	}
	assert!(!delayed.is_completed());

	source.dispatch(0.06);
	assert!(delayed.is_completed_successfully());

	// The expired listener lets go of its source on the next frame at the
	// latest; completion detaches it right away here.
	assert!(source.is_empty());
}

#[test]
fn an_update_delay_throttles_its_progress_reports() {
	let source = Arc::new(ManualUpdateSource::new());
	let delayed = update_delay(1.0, &source);

	let reports = Arc::new(AtomicUsize::new(0));
	{
		let reports = reports.clone();
		delayed.add_progress_callback(ContextDescriptor::Inline, move |_| {
			reports.fetch_add(1, Ordering::Relaxed);
		});
	}

	// 0.4s of frame time in 20ms slices: at most four reports at 100ms
	// spacing (plus none for the sub-threshold remainder).
	for _ in 0..20 {
		source.dispatch(0.02);
	}
	let reported = reports.load(Ordering::Relaxed);
	assert!(reported <= 4, "{reported} reports is above the throttle");
	assert!(reported >= 3, "{reported} reports is suspiciously few");
	assert!(delayed.progress() > 0.0);
}

#[test]
fn a_non_positive_update_delay_is_immediate() {
	let source = Arc::new(ManualUpdateSource::new());
	let delayed = update_delay(0.0, &source);
	assert!(delayed.is_completed_successfully());
	assert!(source.is_empty());
}

#[test]
fn cancelling_an_update_delay_detaches_its_listener() {
	let source = Arc::new(ManualUpdateSource::new());
	let delayed = update_delay(10.0, &source);
	assert_eq!(source.len(), 1);

	delayed.cancel();
	assert!(delayed.is_canceled());
	assert!(source.is_empty());

	// Stray frames after detachment change nothing.
	source.dispatch(100.0);
	assert!(delayed.is_canceled());
}

#[test]
fn update_sources_tolerate_listener_churn_mid_dispatch() {
	let source = Arc::new(ManualUpdateSource::new());
	// Two delays expiring on the same frame both detach inside dispatch.
	let first = update_delay(0.1, &source);
	let second = update_delay(0.1, &source);
	source.dispatch(0.2);
	assert!(first.is_completed_successfully());
	assert!(second.is_completed_successfully());
	assert!(source.is_empty());
}

#[test]
fn delays_compose_with_combinators() {
	let gate = Operation::<i32>::new();
	let raced = fruition::when_any([
		gate.clone().rebind(|value| *value),
		delay(Duration::from_secs(3600)).rebind(|_| -1),
	]);
	gate.try_set_result(5);
	eventually(|| raced.is_completed());
	assert_eq!(raced.result().unwrap().result(), Some(&5));
}
