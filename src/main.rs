use std::{
    process::ExitCode,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use signal_hook::{consts::SIGTERM, iterator::Signals};

use dashmap::DashMap;

use clap::Parser;

use handoff::{
    cancel::cancel::CancelToken, channel::channel::HandoffChannel,
    semaphore::semaphore::Semaphore,
};

/*

stress harness: N producers hand tagged values to M consumers over one
single-slot channel; every delivery is recorded and checked for
duplicates and losses at the end.

./handoff --producers 8 --consumers 8 --values-per-producer 50000

*/

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value_t = 4)]
    producers: u64,

    #[arg(long, default_value_t = 4)]
    consumers: u64,

    #[arg(long, default_value_t = 10000)]
    values_per_producer: u64,

    // permits gating how many producers may contend for the slot at once
    #[arg(long, default_value_t = 2)]
    producer_slots: usize,

    #[arg(long, default_value_t = 100)]
    take_timeout_ms: u64,
}

fn producer_loop(
    channel: Arc<HandoffChannel<u64>>,
    gate: Arc<Semaphore>,
    cancel: CancelToken,
    pid: u64,
    per_producer: u64,
) -> u64 {
    let mut delivered = 0u64;
    for seq in 0..per_producer {
        let _permit = gate.access();
        match channel.put_cancellable(pid * per_producer + seq, &cancel) {
            Ok(()) => delivered += 1,
            Err(_) => {
                //cancelled - value never entered the slot
                break;
            }
        }
    }
    delivered
}

fn consumer_loop(
    channel: Arc<HandoffChannel<u64>>,
    ledger: Arc<DashMap<u64, u64>>,
    cancel: CancelToken,
    take_timeout: Duration,
) -> u64 {
    let mut taken = 0u64;
    loop {
        match channel.take_timeout(take_timeout) {
            Ok(v) => {
                *ledger.entry(v).or_insert(0) += 1;
                taken += 1;
            }
            Err(_) => {
                //timeout tick: exit only once cancelled and drained
                if cancel.is_cancelled() && !channel.is_occupied() {
                    break;
                }
            }
        }
    }
    taken
}

fn main() -> ExitCode {
    let args = Args::parse();

    let producers = args.producers.max(1);
    let consumers = args.consumers.max(1);
    let per_producer = args.values_per_producer.max(1);
    let take_timeout = Duration::from_millis(args.take_timeout_ms.max(1));

    let channel: Arc<HandoffChannel<u64>> = Arc::new(HandoffChannel::new());
    let gate = Arc::new(Semaphore::new(args.producer_slots.max(1)));
    let ledger: Arc<DashMap<u64, u64>> = Arc::new(DashMap::new());
    let cancel = CancelToken::new();

    let Some(mut signals) = Signals::new(&[SIGTERM]).ok() else {
        println!("can't create SIGTERM handler");
        return ExitCode::FAILURE;
    };

    let sigterm_cancel = cancel.clone();
    thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGTERM {
                sigterm_cancel.cancel();
            }
        }
    });

    let mut producer_handles: Vec<JoinHandle<u64>> = Vec::new();
    for pid in 0..producers {
        let channel = channel.clone();
        let gate = gate.clone();
        let cancel = cancel.clone();
        producer_handles.push(thread::spawn(move || {
            producer_loop(channel, gate, cancel, pid, per_producer)
        }));
    }

    let mut consumer_handles: Vec<JoinHandle<u64>> = Vec::new();
    for _ in 0..consumers {
        let channel = channel.clone();
        let ledger = ledger.clone();
        let cancel = cancel.clone();
        consumer_handles.push(thread::spawn(move || {
            consumer_loop(channel, ledger, cancel, take_timeout)
        }));
    }

    let expected = producers * per_producer;

    println!("stress started");

    //watch dog

    while !cancel.is_cancelled() && !producer_handles.iter().all(|h| h.is_finished()) {
        eprint!("\r taken {}/{}", ledger.len(), expected);
        std::io::Write::flush(&mut std::io::stderr()).unwrap();
        thread::sleep(Duration::from_millis(500));
    }
    eprintln!();

    let mut produced = 0u64;
    for handle in producer_handles {
        match handle.join() {
            Ok(count) => produced += count,
            Err(_) => println!("producer join err: thread join err"),
        }
    }

    //producers are done: drain any leftover value here, the consumers may
    //already have stopped on the cancel flag and nobody else would empty it
    let mut taken = 0u64;
    while let Some(v) = channel.try_take() {
        *ledger.entry(v).or_insert(0) += 1;
        taken += 1;
    }
    cancel.cancel();

    for handle in consumer_handles {
        match handle.join() {
            Ok(count) => taken += count,
            Err(_) => println!("consumer join err: thread join err"),
        }
    }

    let unique = ledger.len() as u64;
    let duplicated = ledger.iter().filter(|e| *e.value() > 1).count() as u64;
    let lost = produced.saturating_sub(unique);

    println!(
        "produced {} taken {} unique {} duplicated {} lost {}",
        produced, taken, unique, duplicated, lost
    );

    if duplicated > 0 || lost > 0 {
        println!("stress failed: handoff broke delivery guarantees");
        return ExitCode::FAILURE;
    }

    println!("stress ok");
    ExitCode::SUCCESS
}
