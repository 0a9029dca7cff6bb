mod support;

use std::{
   sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
   },
   thread,
};

use chrono::Utc;
use support::{dated_dockets, due_today, healthy_envelope, store_in};
use tempfile::TempDir;

/// Independent writers sharing one file (as separate machines would) never
/// leave a reader looking at a torn or mixed envelope.
#[test]
fn racing_writers_leave_a_whole_envelope() {
   let dir = TempDir::new().expect("temp dir");
   let a = Arc::new(healthy_envelope(dated_dockets(300, 25000, due_today()), Utc::now()));
   let b = Arc::new(healthy_envelope(dated_dockets(7, 40000, due_today()), Utc::now()));
   store_in(&dir).save(&a).expect("seed");

   let stop = Arc::new(AtomicBool::new(false));
   let writers: Vec<_> = [Arc::clone(&a), Arc::clone(&b)]
      .into_iter()
      .map(|envelope| {
         let store = store_in(&dir);
         thread::spawn(move || {
            for _ in 0..40 {
               store.save(&envelope).expect("save");
            }
         })
      })
      .collect();

   let reader = {
      let store = store_in(&dir);
      let stop = Arc::clone(&stop);
      let (a, b) = (Arc::clone(&a), Arc::clone(&b));
      thread::spawn(move || {
         let mut reads = 0usize;
         loop {
            let loaded = store
               .load()
               .expect("readers never see corruption")
               .expect("file present");
            assert!(loaded == *a || loaded == *b, "mixed envelope observed");
            reads += 1;
            if stop.load(Ordering::SeqCst) {
               return reads;
            }
         }
      })
   };

   for writer in writers {
      writer.join().expect("writer thread");
   }
   stop.store(true, Ordering::SeqCst);
   let reads = reader.join().expect("reader thread");
   assert!(reads > 0);

   let last = store_in(&dir).load().expect("load").expect("envelope");
   assert!(last == *a || last == *b);
}
