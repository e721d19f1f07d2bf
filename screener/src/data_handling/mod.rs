pub mod candidate_table;
