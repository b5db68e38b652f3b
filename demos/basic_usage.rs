use polling_delay_queue::DelayQueue;
use std::thread;
use std::time::Duration;

fn main() {
    let queue: DelayQueue<&str> = DelayQueue::new();

    // Clone the queue and move it to the consumer thread
    let consumer_queue = queue.clone();
    let consumer_handle = thread::spawn(move || {
        // retrieve() blocks until a value is ready
        println!("First retrieve: {}", consumer_queue.retrieve().unwrap()); // Prints "now"
        println!("Second retrieve: {}", consumer_queue.retrieve().unwrap()); // Prints "3s"
    });

    // Clone the queue and move it to the producer thread
    let producer_queue = queue.clone();
    let producer_handle = thread::spawn(move || {
        // This value can only be retrieved after 3 seconds have passed
        producer_queue.insert(Duration::from_secs(3), "3s").unwrap();

        // This value is ready on the next tick
        producer_queue.insert(Duration::from_secs(0), "now").unwrap();
    });

    consumer_handle.join().unwrap();
    producer_handle.join().unwrap();

    assert!(queue.is_empty());
    queue.shutdown().unwrap();
}
