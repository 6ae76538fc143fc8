use std::cell::RefCell;
use std::rc::Rc;

use cluster_sim::domain::cluster_model::job::job::JobState;
use cluster_sim::domain::cluster_model::resource::resource::{Resource, ResourceType};
use cluster_sim::domain::cluster_model::resource::resource_request::ResourceRequest;
use cluster_sim::domain::cluster_model::resource::resources_holder::Holder;
use cluster_sim::domain::cluster_model::scheduler::job_scheduler::JobSchedulerSimple;
use cluster_sim::domain::simulator::event::EventKind;
use cluster_sim::domain::simulator::event_inspector::{EventInspector, ExpectedNotification};
use cluster_sim::domain::simulator::notification::NotificationType;
use cluster_sim::domain::simulator::simulator::Simulator;
use cluster_sim::error::Error;

const EPS: f64 = 1e-9;

fn core(value: f64) -> ResourceRequest {
    ResourceRequest::exclusive(ResourceType::CpuCore, value).unwrap()
}

fn ram(value: f64) -> ResourceRequest {
    ResourceRequest::exclusive(ResourceType::Ram, value).unwrap()
}

fn shared_core() -> ResourceRequest {
    ResourceRequest::shared(ResourceType::CpuCore)
}

#[test]
fn test_single_job_on_exclusive_core() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)]);
    let job0 = sim.add_job(100.0, vec![core(10.0), ram(5.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.run().unwrap();

    assert!((sim.now() - 10.0).abs() < EPS, "Expected end at 10, got {}", sim.now());
}

/// Two jobs on two exclusive cores do not influence each other.
#[test]
fn test_two_jobs_on_two_cores() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)],
    );
    let job0 = sim.add_job(650.0, vec![core(10.0), ram(5.0)], None).unwrap();
    let job1 = sim.add_job(450.0, vec![core(10.0), ram(8.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.add_event(0.0, EventKind::JobStart { job: job1, host: m0 }).unwrap();
    sim.run().unwrap();

    assert!((sim.now() - 65.0).abs() < EPS, "Expected end at 65, got {}", sim.now());
    // Setup resources are back to their nominal capacity
    for id in sim.get_model().get_machine(m0).unwrap().get_resources() {
        let resource = sim.get_model().get_resource(id).unwrap();
        assert!((resource.get_available_value() - resource.get_max_value()).abs() < EPS);
        assert!(!resource.is_used());
    }
}

#[test]
fn test_one_job_on_two_cores_of_different_speed() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::CpuCore, 5.0), Resource::new(ResourceType::Ram, 16.0)],
    );
    let job0 = sim.add_job(150.0, vec![core(10.0), core(5.0), ram(5.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.run().unwrap();

    assert!((sim.now() - 10.0).abs() < EPS, "Expected end at 10, got {}", sim.now());
}

#[test]
fn test_insufficient_ram_fails_without_partial_state() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)],
    );
    let job0 = sim.add_job(650.0, vec![core(10.0), ram(10.0)], None).unwrap();
    let job1 = sim.add_job(450.0, vec![core(10.0), ram(8.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.add_event(0.0, EventKind::JobStart { job: job1, host: m0 }).unwrap();

    let result = sim.run();
    match result {
        Err(Error::AllocationFailed { holder, source }) => {
            assert_eq!(holder, "Job_1");
            assert!(matches!(*source, Error::InsufficientCapacity { rtype: ResourceType::Ram, .. }), "Unexpected cause {:?}", source);
        }
        other => panic!("Expected an allocation failure, got {:?}", other),
    }

    assert_eq!(sim.get_model().get_job(job1).unwrap().get_holder().is_allocated(), 0.0);
    let cores: Vec<f64> = sim
        .get_model()
        .get_machine(m0)
        .unwrap()
        .get_resources()
        .into_iter()
        .map(|id| sim.get_model().get_resource(id).unwrap())
        .filter(|r| r.get_type() == ResourceType::CpuCore)
        .map(|r| r.get_available_value())
        .collect();
    assert_eq!(cores, vec![0.0, 10.0], "The core granted to job1 before the RAM failure must be returned");
}

#[test]
fn test_shared_core_is_split_fairly() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)]);
    let job0 = sim.add_job(200.0, vec![shared_core(), ram(5.0)], None).unwrap();
    let job1 = sim.add_job(200.0, vec![shared_core(), ram(8.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.add_event(0.0, EventKind::JobStart { job: job1, host: m0 }).unwrap();
    sim.run().unwrap();

    assert!((sim.now() - 40.0).abs() < EPS, "Expected end at 40, got {}", sim.now());
}

/// A job asking for two shared cores lands on the less crowded ones.
#[test]
fn test_late_job_spreads_over_shared_cores() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)],
    );
    let job0 = sim.add_job(600.0, vec![shared_core(), shared_core(), ram(5.0)], None).unwrap();
    let job1 = sim.add_job(400.0, vec![shared_core(), ram(8.0)], None).unwrap();

    sim.add_event(30.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.add_event(0.0, EventKind::JobStart { job: job1, host: m0 }).unwrap();
    sim.run().unwrap();

    assert!((sim.now() - 65.0).abs() < EPS, "Expected end at 65, got {}", sim.now());
}

#[test]
fn test_exclusive_grant_from_shared_core_triggers_recalculation() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)]);
    let job0 = sim.add_job(20.0, vec![core(2.0), ram(5.0)], None).unwrap();
    let job1 = sim.add_job(40.0, vec![shared_core(), ram(5.0)], None).unwrap();
    let job2 = sim.add_job(50.0, vec![shared_core(), ram(5.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.add_event(5.0, EventKind::JobStart { job: job1, host: m0 }).unwrap();
    sim.add_event(5.0, EventKind::JobStart { job: job2, host: m0 }).unwrap();

    let inspector = Rc::new(RefCell::new(EventInspector::new(vec![
        ExpectedNotification::job(NotificationType::JobStart, 0.0, job0),
        ExpectedNotification::job(NotificationType::JobStart, 5.0, job1),
        ExpectedNotification::job(NotificationType::JobStart, 5.0, job2),
        ExpectedNotification::job(NotificationType::JobFinish, 10.0, job0),
        ExpectedNotification::job(NotificationType::JobFinish, 14.0, job1),
        ExpectedNotification::job(NotificationType::JobFinish, 15.0, job2),
    ])));
    sim.register_listener(inspector.clone());
    sim.run().unwrap();

    let inspector = inspector.borrow();
    assert!(inspector.all_registered(), "Missing notifications: {:?}", inspector.get_missing());
}

#[test]
fn test_recalculation_replaces_pending_finish() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)]);
    let job0 = sim.add_job(100.0, vec![shared_core(), ram(1.0)], None).unwrap();
    let job1 = sim.add_job(100.0, vec![shared_core(), ram(1.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.add_event(5.0, EventKind::JobStart { job: job1, host: m0 }).unwrap();

    while sim.now() < 5.0 || sim.get_model().get_job(job1).unwrap().get_predicted_finish().is_none() {
        assert!(sim.step().unwrap());
    }
    // Let the recalculation of job0 run
    sim.step().unwrap();

    let finishes = sim.get_queue().len();
    assert_eq!(finishes, 2, "Exactly one pending JobFinish per running job");
    let finish = sim.get_model().get_job(job0).unwrap().get_predicted_finish().unwrap();
    let event = sim.get_queue().get(finish).unwrap();
    // 50 ops at 10 until t=5, then 50 at 5
    assert!((event.time - 15.0).abs() < EPS, "Expected job0 to finish at 15, got {}", event.time);

    sim.run().unwrap();
    assert!((sim.now() - 20.0).abs() < EPS, "Expected end at 20, got {}", sim.now());
}

#[test]
fn test_free_of_unallocated_job_fails() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0)]);
    let job0 = sim.add_job(10.0, vec![shared_core()], None).unwrap();

    assert!(matches!(sim.free(m0, Holder::Job(job0)), Err(Error::NotAllocated { .. })));
    sim.allocate(m0, Holder::Job(job0)).unwrap();
    assert!(matches!(sim.allocate(m0, Holder::Job(job0)), Err(Error::AlreadyAllocated { .. })));
}

#[test]
fn test_gpu_work_is_scaled_by_frequency() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0), Resource::with_freq(ResourceType::Gpu, 1024.0, 2.0)],
    );
    let gpu = ResourceRequest::exclusive(ResourceType::Gpu, 512.0).unwrap();
    let job0 = sim.add_job([(ResourceType::CpuCore, 10.0), (ResourceType::Gpu, 512.0 * 2.0 * 8.0)], vec![shared_core(), gpu, ram(1.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();
    sim.run().unwrap();

    // CPU needs 1s, the GPU slice of 512 cores at 2 GHz needs 8s
    assert!((sim.now() - 8.0).abs() < EPS, "Expected end at 8, got {}", sim.now());
}

/// Two RAM requests that only fit together on the single RAM unit are admitted and actually start.
#[test]
fn test_stacked_ram_requests_are_admitted_and_start() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)]);
    sim.set_job_scheduler(m0, JobSchedulerSimple::new(m0, false)).unwrap();
    let job0 = sim.add_job(100.0, vec![shared_core(), ram(3.0), ram(4.0)], None).unwrap();

    assert!(sim.get_model().is_fittable(m0, Holder::Job(job0)).unwrap());
    sim.schedule_job(job0, m0).unwrap();
    sim.run().unwrap();

    assert_eq!(sim.get_model().get_job(job0).unwrap().get_state(), JobState::Finished);
    assert!((sim.now() - 10.0).abs() < EPS, "Expected end at 10, got {}", sim.now());
}

#[test]
fn test_fittable_and_allocate_agree_in_any_declaration_order() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::Ram, 6.0), Resource::new(ResourceType::Ram, 4.0)]);
    let fits = sim.add_job(1.0, vec![ram(3.0), ram(4.0), ram(3.0)], None).unwrap();
    let too_big = sim.add_job(1.0, vec![ram(5.0), ram(5.0)], None).unwrap();

    assert!(sim.get_model().is_fittable(m0, Holder::Job(fits)).unwrap());
    sim.allocate(m0, Holder::Job(fits)).unwrap();
    let left: Vec<f64> = sim.get_model().get_machine(m0).unwrap().get_resources().into_iter().map(|id| sim.get_model().get_resource(id).unwrap().get_available_value()).collect();
    assert_eq!(left, vec![0.0, 0.0]);
    sim.free(m0, Holder::Job(fits)).unwrap();

    assert!(!sim.get_model().is_fittable(m0, Holder::Job(too_big)).unwrap());
    assert!(matches!(sim.allocate(m0, Holder::Job(too_big)), Err(Error::AllocationFailed { .. })));
}

#[test]
fn test_allocation_failure_reports_remaining_capacity() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)]);
    let job0 = sim.add_job(1.0, vec![shared_core(), ram(10.0), ram(8.0)], None).unwrap();

    match sim.allocate(m0, Holder::Job(job0)) {
        Err(Error::AllocationFailed { source, .. }) => match *source {
            Error::InsufficientCapacity { rtype, requested, available } => {
                assert_eq!(rtype, ResourceType::Ram);
                assert_eq!(requested, 8.0);
                assert!((available - 6.0).abs() < EPS, "Only 6 GB are left after the first request, got {}", available);
            }
            other => panic!("Unexpected cause {:?}", other),
        },
        other => panic!("Expected an allocation failure, got {:?}", other),
    }
}

#[test]
fn test_start_without_needed_capacity_releases_grants() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine("m0", vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)]);
    let job0 = sim.add_job([(ResourceType::CpuCore, 10.0), (ResourceType::Gpu, 100.0)], vec![shared_core(), ram(4.0)], None).unwrap();

    sim.add_event(0.0, EventKind::JobStart { job: job0, host: m0 }).unwrap();

    assert!(matches!(sim.run(), Err(Error::NoCapacity { rtype: ResourceType::Gpu, .. })));
    let job = sim.get_model().get_job(job0).unwrap();
    assert_eq!(job.get_state(), JobState::Created);
    assert_eq!(job.get_holder().is_allocated(), 0.0);
    let machine = sim.get_model().get_machine(m0).unwrap();
    assert!(machine.is_idle());
    for id in machine.get_resources() {
        let resource = sim.get_model().get_resource(id).unwrap();
        assert!(!resource.is_used());
        assert_eq!(resource.get_dynamic_users(), 0);
        assert!((resource.get_available_value() - resource.get_max_value()).abs() < EPS);
    }
}
