pub mod counting_process;
