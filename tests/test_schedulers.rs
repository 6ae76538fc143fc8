use std::cell::RefCell;
use std::rc::Rc;

use cluster_sim::domain::cluster_model::cluster_model::ClusterModel;
use cluster_sim::domain::cluster_model::job::job::JobId;
use cluster_sim::domain::cluster_model::machine::machine::MachineId;
use cluster_sim::domain::cluster_model::placement::placement_policy::{VmPlacementPolicyRandom, VmPlacementPolicyScored, VmPlacementPolicySimple};
use cluster_sim::domain::cluster_model::resource::resource::{Resource, ResourceType};
use cluster_sim::domain::cluster_model::resource::resource_request::ResourceRequest;
use cluster_sim::domain::cluster_model::scheduler::job_scheduler::JobSchedulerSimple;
use cluster_sim::domain::cluster_model::scheduler::vm_scheduler::VmSchedulerSimple;
use cluster_sim::domain::simulator::event::{EventKind, ScheduleTarget};
use cluster_sim::domain::simulator::event_inspector::{EventInspector, ExpectedNotification};
use cluster_sim::domain::simulator::notification::NotificationType;
use cluster_sim::domain::simulator::simulator::Simulator;
use cluster_sim::error::Error;

const EPS: f64 = 1e-9;

fn shared_core() -> ResourceRequest {
    ResourceRequest::shared(ResourceType::CpuCore)
}

fn ram(value: f64) -> ResourceRequest {
    ResourceRequest::exclusive(ResourceType::Ram, value).unwrap()
}

fn gpu(value: f64) -> ResourceRequest {
    ResourceRequest::exclusive(ResourceType::Gpu, value).unwrap()
}

fn host(sim: &mut Simulator, name: &str, ram: f64) -> MachineId {
    sim.add_machine(name, vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, ram)])
}

/// The three jobs every VM of these scenarios may run: `(operations, RAM)`.
const JOBS: [(f64, f64); 3] = [(500.0, 8.0), (1000.0, 6.0), (1000.0, 6.0)];

/// A VM sharing its host's core, with an autofree job scheduler holding the selected jobs.
fn vm_with_jobs(sim: &mut Simulator, name: &str, vm_ram: f64, jobs: &[usize]) -> (MachineId, Vec<JobId>) {
    let vm = sim.add_virtual_machine(name, vec![shared_core(), ram(vm_ram)]);
    sim.set_job_scheduler(vm, JobSchedulerSimple::new(vm, true)).unwrap();

    let mut ids = Vec::new();
    for i in jobs {
        let (ops, job_ram) = JOBS[*i];
        let job = sim.add_job(ops, vec![shared_core(), ram(job_ram)], None).unwrap();
        sim.schedule_job(job, vm).unwrap();
        ids.push(job);
    }
    (vm, ids)
}

#[test]
fn test_job_scheduler_simple() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    sim.set_job_scheduler(m0, JobSchedulerSimple::new(m0, true)).unwrap();

    for (ops, job_ram) in JOBS {
        let job = sim.add_job(ops, vec![shared_core(), ram(job_ram)], None).unwrap();
        sim.schedule_job(job, m0).unwrap();
    }
    sim.run().unwrap();

    assert!((sim.now() - 250.0).abs() < EPS, "Expected end at 250, got {}", sim.now());
}

#[test]
fn test_vm_scheduler_simple() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    sim.set_vm_scheduler(m0, VmSchedulerSimple::new(m0)).unwrap();

    let mut vms = Vec::new();
    for i in 0..4 {
        let (vm, _) = vm_with_jobs(&mut sim, &format!("vm{}", i), 8.0, &[0, 1, 2]);
        sim.schedule_vm(vm, m0).unwrap();
        vms.push(vm);
    }
    sim.run().unwrap();

    assert!((sim.now() - 1000.0).abs() < EPS, "Expected end at 1000, got {}", sim.now());
    for vm in vms {
        assert_eq!(sim.get_model().get_machine(vm).unwrap().get_host(), None, "Autofree VMs end themselves");
    }
    assert!(sim.get_model().get_machine(m0).unwrap().is_idle());
}

#[test]
fn test_placement_policy_simple() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 8.0);
    let m1 = host(&mut sim, "m1", 16.0);
    sim.set_vm_scheduler(m0, VmSchedulerSimple::new(m0)).unwrap();
    sim.set_vm_scheduler(m1, VmSchedulerSimple::new(m1)).unwrap();
    sim.set_infrastructure(vec![m0, m1], VmPlacementPolicySimple::new(&[m0, m1]));

    let mut placements = Vec::new();
    for (name, vm_ram, jobs) in [("vm0", 8.0, vec![0]), ("vm1", 8.0, vec![1, 2]), ("vm2", 16.0, vec![0, 1, 2]), ("vm3", 12.0, vec![1, 2])] {
        let (vm, _) = vm_with_jobs(&mut sim, name, vm_ram, &jobs);
        placements.push(sim.schedule_vm_on_infrastructure(vm).unwrap());
    }
    assert_eq!(placements, vec![m0, m1, m1, m1]);

    sim.run().unwrap();
    assert!((sim.now() - 650.0).abs() < EPS, "Expected end at 650, got {}", sim.now());
}

#[test]
fn test_job_scheduling_with_gpu() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0), Resource::with_freq(ResourceType::Gpu, 1664.0, 1.05)],
    );
    sim.set_job_scheduler(m0, JobSchedulerSimple::new(m0, true)).unwrap();

    for (ops, gpu_cores) in [(500.0, 1024.0), (1000.0, 1024.0), (1000.0, 512.0)] {
        let job = sim.add_job(ops, vec![shared_core(), gpu(gpu_cores), ram(6.0)], None).unwrap();
        sim.schedule_job(job, m0).unwrap();
    }
    sim.run().unwrap();

    assert!((sim.now() - 250.0).abs() < EPS, "Expected end at 250, got {}", sim.now());
}

#[test]
fn test_gpu_length_decides_schedule() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![
            Resource::new(ResourceType::CpuCore, 10.0),
            Resource::new(ResourceType::CpuCore, 10.0),
            Resource::new(ResourceType::Ram, 16.0),
            Resource::with_freq(ResourceType::Gpu, 1664.0, 1.0),
        ],
    );
    sim.set_job_scheduler(m0, JobSchedulerSimple::new(m0, false)).unwrap();

    let operations = [(ResourceType::CpuCore, 200.0), (ResourceType::Gpu, 1024.0 * 15.0)];
    let job0 = sim.add_job(operations, vec![shared_core(), shared_core(), ram(5.0), gpu(1024.0)], None).unwrap();
    let job1 = sim.add_job(operations, vec![shared_core(), ram(5.0), gpu(1024.0)], None).unwrap();
    sim.schedule_job(job0, m0).unwrap();
    sim.schedule_job(job1, m0).unwrap();

    let inspector = Rc::new(RefCell::new(EventInspector::new(vec![
        ExpectedNotification::job(NotificationType::JobStart, 0.0, job0),
        ExpectedNotification::job(NotificationType::JobFinish, 15.0, job0),
        ExpectedNotification::job(NotificationType::JobStart, 15.0, job1),
        ExpectedNotification::job(NotificationType::JobFinish, 35.0, job1),
    ])));
    sim.register_listener(inspector.clone());
    sim.run().unwrap();

    let inspector = inspector.borrow();
    assert!(inspector.all_registered(), "Missing notifications: {:?}", inspector.get_missing());
}

#[test]
fn test_never_fitting_job_is_rejected_at_admission() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    sim.set_job_scheduler(m0, JobSchedulerSimple::new(m0, false)).unwrap();

    let too_big = sim.add_job(10.0, vec![shared_core(), ram(32.0)], None).unwrap();
    let two_cores = sim.add_job(10.0, vec![ResourceRequest::exclusive(ResourceType::CpuCore, 6.0).unwrap(), ResourceRequest::exclusive(ResourceType::CpuCore, 6.0).unwrap()], None).unwrap();

    assert!(matches!(sim.schedule_job(too_big, m0), Err(Error::NeverFits { .. })));
    assert!(matches!(sim.schedule_job(two_cores, m0), Err(Error::NeverFits { .. })));
    assert!(sim.get_schedulers().get_queued_jobs(sim.get_model().get_machine(m0).unwrap().get_job_scheduler().unwrap()).unwrap().is_empty());
}

#[test]
fn test_scheduling_without_scheduler_fails() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    let job = sim.add_job(10.0, vec![shared_core()], None).unwrap();
    let vm = sim.add_virtual_machine("vm0", vec![shared_core()]);

    assert!(matches!(sim.schedule_job(job, m0), Err(Error::NoScheduler { kind: "job", .. })));
    assert!(matches!(sim.schedule_vm(vm, m0), Err(Error::NoScheduler { kind: "VM", .. })));
}

#[test]
fn test_job_on_unplaced_vm_is_rejected() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    sim.set_vm_scheduler(m0, VmSchedulerSimple::new(m0)).unwrap();
    sim.set_infrastructure(vec![m0], VmPlacementPolicySimple::new(&[m0]));

    let (vm, _) = vm_with_jobs(&mut sim, "vm0", 8.0, &[]);
    let job = sim.add_job(10.0, vec![shared_core(), ram(2.0)], None).unwrap();
    assert!(matches!(sim.schedule_job_on_vm(job, vm), Err(Error::UnknownVm(_))));

    sim.schedule_vm_on_infrastructure(vm).unwrap();
    sim.schedule_job_on_vm(job, vm).unwrap();
    sim.run().unwrap();
    assert!((sim.now() - 1.0).abs() < EPS, "Expected end at 1, got {}", sim.now());
}

#[test]
fn test_vm_too_big_for_every_machine() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 8.0);
    sim.set_vm_scheduler(m0, VmSchedulerSimple::new(m0)).unwrap();
    sim.set_infrastructure(vec![m0], VmPlacementPolicySimple::new(&[m0]));

    let vm = sim.add_virtual_machine("vm0", vec![shared_core(), ram(12.0)]);
    assert!(matches!(sim.schedule_vm_on_infrastructure(vm), Err(Error::NoSuitableMachine(_))));
}

#[test]
fn test_vm_schedule_event_places_later() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    sim.set_vm_scheduler(m0, VmSchedulerSimple::new(m0)).unwrap();
    sim.set_infrastructure(vec![m0], VmPlacementPolicySimple::new(&[m0]));
    let (vm, jobs) = vm_with_jobs(&mut sim, "vm0", 8.0, &[0]);

    sim.add_event(5.0, EventKind::VmSchedule { vm, target: ScheduleTarget::Infrastructure }).unwrap();
    let inspector = Rc::new(RefCell::new(EventInspector::new(vec![
        ExpectedNotification::vm(NotificationType::Other, 5.0, vm),
        ExpectedNotification::vm(NotificationType::VmStart, 5.0, vm),
        ExpectedNotification::job(NotificationType::JobStart, 5.0, jobs[0]),
        ExpectedNotification::job(NotificationType::JobFinish, 55.0, jobs[0]),
        ExpectedNotification::vm(NotificationType::VmEnd, 55.0, vm),
    ])));
    sim.register_listener(inspector.clone());
    sim.run().unwrap();

    assert!(inspector.borrow().all_registered(), "Missing notifications: {:?}", inspector.borrow().get_missing());
    assert!(sim.get_infrastructure().unwrap().knows_vm(vm));
}

#[test]
fn test_vm_schedule_event_to_machine() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    sim.set_vm_scheduler(m0, VmSchedulerSimple::new(m0)).unwrap();
    let (vm, _) = vm_with_jobs(&mut sim, "vm0", 8.0, &[1]);

    sim.add_event(2.0, EventKind::VmSchedule { vm, target: ScheduleTarget::Machine(m0) }).unwrap();
    sim.run().unwrap();

    assert!((sim.now() - 102.0).abs() < EPS, "Expected end at 102, got {}", sim.now());
}

#[test]
fn test_seeded_random_placement_is_reproducible() {
    fn place_all(seed: u64) -> Vec<usize> {
        let mut sim = Simulator::default();
        let machines: Vec<MachineId> = (0..4).map(|i| host(&mut sim, &format!("m{}", i), 64.0)).collect();
        for machine in &machines {
            sim.set_vm_scheduler(*machine, VmSchedulerSimple::new(*machine)).unwrap();
        }
        sim.set_infrastructure(machines.clone(), VmPlacementPolicyRandom::with_seed(&machines, seed));

        (0..10)
            .map(|i| {
                let vm = sim.add_virtual_machine(&format!("vm{}", i), vec![shared_core(), ram(4.0)]);
                let machine = sim.schedule_vm_on_infrastructure(vm).unwrap();
                machines.iter().position(|m| *m == machine).unwrap()
            })
            .collect()
    }

    assert_eq!(place_all(7), place_all(7));
}

#[test]
fn test_random_placement_skips_unfittable_machines() {
    let mut sim = Simulator::default();
    let small = host(&mut sim, "small", 4.0);
    let big = host(&mut sim, "big", 32.0);
    sim.set_vm_scheduler(small, VmSchedulerSimple::new(small)).unwrap();
    sim.set_vm_scheduler(big, VmSchedulerSimple::new(big)).unwrap();
    sim.set_infrastructure(vec![small, big], VmPlacementPolicyRandom::with_seed(&[small, big], 3));

    for i in 0..5 {
        let vm = sim.add_virtual_machine(&format!("vm{}", i), vec![shared_core(), ram(16.0)]);
        assert_eq!(sim.schedule_vm_on_infrastructure(vm).unwrap(), big);
    }
}

#[test]
fn test_scored_placement_takes_highest_score() {
    let mut sim = Simulator::default();
    let m0 = host(&mut sim, "m0", 16.0);
    let m1 = host(&mut sim, "m1", 32.0);
    let m2 = host(&mut sim, "m2", 32.0);
    for machine in [m0, m1, m2] {
        sim.set_vm_scheduler(machine, VmSchedulerSimple::new(machine)).unwrap();
    }
    // Most RAM wins
    let score = Box::new(|model: &ClusterModel, _vm: MachineId, machine: MachineId| {
        model.get_max_resources(machine).unwrap().iter().filter(|(t, _)| *t == ResourceType::Ram).map(|(_, v)| *v).sum::<f64>()
    });
    sim.set_infrastructure(vec![m0, m1, m2], VmPlacementPolicyScored::new(&[m0, m1, m2], score));

    let vm = sim.add_virtual_machine("vm0", vec![shared_core(), ram(8.0)]);
    assert_eq!(sim.schedule_vm_on_infrastructure(vm).unwrap(), m1, "First machine wins ties");
}

#[test]
fn test_minimal_vm_runs_its_jobs_and_ends() {
    let mut sim = Simulator::default();
    let m0 = sim.add_machine(
        "m0",
        vec![Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::CpuCore, 10.0), Resource::new(ResourceType::Ram, 16.0)],
    );
    sim.set_vm_scheduler(m0, VmSchedulerSimple::new(m0)).unwrap();
    sim.set_infrastructure(vec![m0], VmPlacementPolicySimple::new(&[m0]));

    let job0 = sim.add_job(200.0, vec![shared_core(), shared_core(), ram(4.0)], None).unwrap();
    let job1 = sim.add_job(100.0, vec![shared_core(), ram(6.0)], None).unwrap();
    let vm = sim.add_minimal_vm("vm0", &[job0, job1], true).unwrap();

    let requests = sim.get_model().get_machine(vm).unwrap().get_virtual_machine().unwrap().get_holder().get_resource_requests();
    assert_eq!(requests, vec![ResourceRequest::dedicated(ResourceType::CpuCore), ResourceRequest::dedicated(ResourceType::CpuCore), ram(6.0)]);
    assert_eq!(sim.pending_jobs(vm).unwrap(), vec![job0, job1]);

    sim.schedule_vm_on_infrastructure(vm).unwrap();
    sim.run().unwrap();

    // job0 alone on 2×10, then job1 on one core
    assert!((sim.now() - 20.0).abs() < EPS, "Expected end at 20, got {}", sim.now());
    assert_eq!(sim.get_model().get_machine(vm).unwrap().get_host(), None);
    assert_eq!(sim.get_model().get_resources().len(), 3);
}
