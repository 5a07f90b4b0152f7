// Unit tests for posture analysis
// These tests exercise the analyzer directly on landmark fixtures
